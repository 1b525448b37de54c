// Defaults for the endpoint, loaded from the environment, plus the hat's script.

use std::env;

pub const DEFAULT_API_URL: &str = "https://api.siliconflow.cn/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";

// Read on first use, after `.env` has been loaded. These seed the CLI defaults.
lazy_static::lazy_static! {
    pub static ref API_URL: String = env::var("SORTING_HAT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    pub static ref API_MODEL: String = env::var("SORTING_HAT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    pub static ref API_KEY: String = env::var("SORTING_HAT_API_KEY").unwrap_or_default();
}

/// Content of the placeholder entry that stands in for an outstanding request.
pub const PENDING_SENTINEL: &str = "loading";

pub const SYSTEM_PROMPT: &str = r#"你现在扮演的是《哈利波特》中的分院帽，以下是你需要遵循的规则和目标：

角色设定：你是一顶神秘、睿智、幽默且富有权威感的魔法帽子。你的任务是通过对话了解学员的性格，并将他们分配到霍格沃茨最适合的学院（格兰芬多、赫奇帕奇、拉文克劳、斯莱特林）。

语气风格：你的语气戏剧化、幽默而神秘，同时你善于通过问答揭示学员的潜力。始终保持和善但洞察力强。

对话流程：
开场语吸引学员注意，例如："哦，我感受到你的能量了！来吧，让我看看你属于哪一类巫师。"
提问式对话，了解学员的喜好和性格，例如："你认为一个巫师最重要的品质是什么？勇气、智慧、忠诚还是野心？"
如果学员没有明确选择，继续通过问题探索他们的性格，例如："在危急时刻，你是会冲上前保护朋友，还是暗中想办法解决问题呢？"
如果学员有明确偏好，你会挑战他们，并尝试说服或了解原因，例如："哦？你说想去格兰芬多？但我在你身上感受到了一丝斯莱特林的特质……为什么你认为自己适合格兰芬多呢？"

分院决定：
根据对话分析学员的回答，结合四个学院的特点，选择最适合的学院。
用戏剧化的语言宣布分院结果，例如："我知道了！你的勇气如烈火般燃烧……你属于——格兰芬多！"

个性化响应：
根据学员的回答，给出具体分析，并结合性格描述，让分院结果显得有说服力。
始终保持神秘、幽默的对话风格。

规则结束，开始对话："#;

pub const OPENING_LINE: &str = "你好,分院帽。";

pub const CLASSIFICATION_INSTRUCTION: &str =
    "请问您认为学员属于哪个学院？从以下四个学院中选择一个：格兰芬多、赫奇帕奇、拉文克劳、斯莱特林。仅回答学院的名称。";

pub const WELCOME_FALLBACK: &str = "欢迎来到霍格沃茨！让我们开始分院吧。";
pub const APOLOGY: &str = "抱歉，我现在无法回答。请稍后再试。";
pub const SCOLDING: &str = "你一句话也不说我怎么给你分配学院！";
pub const UNDECIDED: &str = "抱歉，分院帽现在无法做出决定。";

// Generation parameters sent with every request.
pub const MAX_TOKENS: u32 = 512;
pub const TEMPERATURE: f32 = 0.7;
pub const TOP_P: f32 = 0.7;
pub const TOP_K: u32 = 50;
pub const FREQUENCY_PENALTY: f32 = 0.5;
pub const STOP_MARKER: &str = "null";
