use std::time::Duration;

/// Used when the caller sends no prompt or only whitespace.
pub const DEFAULT_PROMPT: &str = "生成可爱的卡通风格";

/// Fixed attempt budget per request.
pub const MAX_ATTEMPTS: usize = 7;

pub const VARIANT_COUNT: usize = 5;

/// Backoff ceiling in seconds.
const MAX_BACKOFF_SECS: u64 = 10;

/// Which provider slot an attempt index is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSlot {
    Primary,
    Secondary,
    Tertiary,
}

impl ProviderSlot {
    /// Fixed schedule: 0..=4 primary, 5 secondary, 6 tertiary.
    pub fn for_attempt(index: usize) -> Self {
        match index {
            5 => Self::Secondary,
            6 => Self::Tertiary,
            _ => Self::Primary,
        }
    }
}

/// Delay after a failed attempt `index`, or `None` after the final one.
pub fn backoff_after(index: usize) -> Option<Duration> {
    if index + 1 >= MAX_ATTEMPTS {
        return None;
    }
    let secs = (2 * (index as u64 + 1)).min(MAX_BACKOFF_SECS);
    Some(Duration::from_secs(secs))
}

pub fn effective_prompt(prompt: Option<&str>) -> &str {
    prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PROMPT)
}

/// Expand a base prompt into the five fixed variants: themed, intensified,
/// simplified, softened, professional.
pub fn variants(base: &str) -> [String; VARIANT_COUNT] {
    [
        format!("{base}，融入GOSIM开发者大会的科技与开源主题"),
        format!("{base}，色彩更加鲜明饱和，卡通特征更加夸张突出"),
        format!("简洁的卡通风格，{base}，减少细节，构图干净"),
        format!("{base}，整体风格柔和温暖，线条圆润，色调清新"),
        format!("{base}，突出专业的开发者与技术参会者形象，画面精致"),
    ]
}

pub fn variant_for_attempt(variants: &[String; VARIANT_COUNT], index: usize) -> &str {
    &variants[index % VARIANT_COUNT]
}

/// Wrap a variant in the structural template sent to image providers.
pub fn build_instruction(variant: &str) -> String {
    format!(
        "用户需求：{variant}

请将参考图中的内容按照用户需求重新绘制为卡通风格，适用于开发者会议场景：
1. 如果是人物：保持面部特征、发型、服装等个人识别要素，突出开发者/参会者的专业形象
2. 如果是会场场景：保持会议室布局、演讲台、投影屏幕、座椅排列等空间特征
3. 如果是技术展示：保持代码界面、设备外观、屏幕内容等科技元素的可识别性
4. 采用卡通化表现手法：线条清晰流畅，色彩鲜明饱和，风格统一现代
5. 融入GOSIM开发者大会的氛围元素：科技感、创新感、专业感
6. 背景可适当融入杭州科技园区或会议场馆的特色，但保持简洁不抢夺主体
7. 避免添加文字、水印、多余装饰，保持专业简洁

最终效果要求：既有卡通趣味性又保持技术会议的专业感，色彩和谐，构图完整。"
    )
}

/// Instruction for the auxiliary text model that rewrites user prompts.
pub fn rewrite_instruction(original: &str) -> String {
    format!(
        "你是一个专业的AI图像生成prompt优化专家。请将以下用户输入的prompt优化为更适合图像生成的描述：

用户原始prompt: \"{original}\"

请基于以下要求优化：
1. 保持用户的核心意图
2. 适合GOSIM开发者大会的场景（杭州科技氛围，开源精神）
3. 添加卡通风格相关的细节描述
4. 突出专业程序员形象
5. 使用清晰、具体的视觉描述词汇
6. 避免模糊或抽象的表达

请只返回优化后的prompt，不要包含其他解释。优化后的prompt应该在100-150字之间。"
    )
}
