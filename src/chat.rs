// Line-oriented chat with the hat over stdin/stdout.

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::info;

use crate::app_state::Phase;
use crate::conversation::Role;
use crate::flow::{Action, FlowController};
use crate::llm_interaction::ChatTransport;

const HAT: &str = "分院帽";
const YOU: &str = "你";

/// Runs one session. Returns the decided house, or `None` if the user left first.
pub async fn run_chat<R: BufRead, W: Write>(
    flow: &mut FlowController,
    transport: &dyn ChatTransport,
    input: R,
    output: &mut W,
) -> Result<Option<String>> {
    info!("Starting line chat");
    writeln!(output, "分院帽测试")?;
    writeln!(output, "(/sort 分院, /history 历史, /quit 退出)")?;

    if let Some(request) = flow.dispatch(Action::Enter) {
        flow.run(transport, request).await;
    }
    print_new_reply(flow, 0, output)?;

    for line in input.lines() {
        let line = line?;
        let reply_epoch = flow.state().reply_epoch;

        match line.trim() {
            "/quit" => break,
            "/history" => print_history(flow, output)?,
            "/sort" => {
                if let Some(request) = flow.dispatch(Action::Classify) {
                    flow.run(transport, request).await;
                }
                if flow.state().phase == Phase::Result {
                    let house = flow
                        .state()
                        .outcome
                        .as_ref()
                        .map(|o| o.display_name().to_string())
                        .unwrap_or_default();
                    writeln!(output, "分院结果: {}", house)?;
                    return Ok(Some(house));
                }
                print_new_reply(flow, reply_epoch, output)?;
            }
            _ => {
                flow.set_input(line.as_str());
                if let Some(request) = flow.dispatch(Action::Submit) {
                    flow.run(transport, request).await;
                }
                print_new_reply(flow, reply_epoch, output)?;
            }
        }
    }

    info!("Line chat ended without a sorting");
    Ok(None)
}

fn print_new_reply<W: Write>(flow: &FlowController, seen_epoch: u64, output: &mut W) -> Result<()> {
    if flow.state().reply_epoch == seen_epoch {
        return Ok(());
    }
    if let Some(message) = flow.state().conversation.latest_assistant() {
        writeln!(output, "{}: {}", HAT, message.content)?;
    }
    Ok(())
}

fn print_history<W: Write>(flow: &FlowController, output: &mut W) -> Result<()> {
    writeln!(output, "--- 对话历史 ---")?;
    for message in flow.state().conversation.iter() {
        let speaker = match message.role {
            Role::User => YOU,
            Role::Assistant => HAT,
        };
        writeln!(output, "{}: {}", speaker, message.content)?;
    }
    writeln!(output, "---")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_interaction::{ChatMessage, TransportError};
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Numbers its replies and names Ravenclaw when asked to classify.
    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatTransport for CountingTransport {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            if last.contains("仅回答学院的名称") {
                Ok("拉文克劳".to_string())
            } else {
                Ok(format!("reply {}", n))
            }
        }
    }

    async fn chat(script: &str) -> (Option<String>, String, usize) {
        let transport = CountingTransport::default();
        let mut flow = FlowController::default();
        let mut out = Vec::new();
        let house = run_chat(&mut flow, &transport, Cursor::new(script.to_string()), &mut out)
            .await
            .unwrap();
        (
            house,
            String::from_utf8(out).unwrap(),
            transport.calls.load(Ordering::SeqCst),
        )
    }

    #[tokio::test]
    async fn test_chat_until_sorted() {
        let (house, out, calls) = chat("I read a lot\n/sort\nnever read\n").await;
        assert_eq!(house.as_deref(), Some("拉文克劳"));
        assert!(out.contains("分院帽: reply 0"));
        assert!(out.contains("分院帽: reply 1"));
        assert!(out.contains("分院结果: 拉文克劳"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_sort_before_talking_scolds() {
        let (house, out, calls) = chat("/sort\n/sort\n/quit\n").await;
        assert!(house.is_none());
        assert_eq!(out.matches(crate::constants::SCOLDING).count(), 1);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_blank_lines_and_history() {
        let (house, out, calls) = chat("\n   \nhi\n/history\n").await;
        assert!(house.is_none());
        assert_eq!(calls, 2);
        assert!(out.contains("--- 对话历史 ---"));
        assert!(out.contains("你: hi"));
    }
}
