//! 通用文本与数值工具

use validator::ValidationError;

/// 去掉首尾空白，空字符串视为未填写
pub fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 必填文本去掉首尾空白后不能为空
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("不能只包含空白字符".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// 把连续空白折叠成单个空格
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// LIKE 子串匹配模式，转义 `\`、`%` 和 `_`，与 [`LIKE_ESCAPE`] 配合使用
pub fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for ch in search.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

pub const LIKE_ESCAPE: &str = " ESCAPE '\\'";

/// 四舍五入到两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 百分比，分母为 0 时返回 0
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / whole as f64)
    }
}
