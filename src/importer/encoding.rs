// ==========================================
// 教会行政数据交换系统 - 文本编码识别
// ==========================================
// 顺序: BOM → UTF-8 → GB18030（地区回退）→ Windows-1252（宽松单字节回退）
// 分隔符: 逗号 / 分号 / 制表符，按表头行出现次数选择
// ==========================================

use crate::importer::error::{IngestError, IngestResult};
use encoding_rs::{Encoding, GB18030, WINDOWS_1252};

/// 解码后的文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    /// 实际使用的编码名称（如 "UTF-8"、"gb18030"）
    pub encoding: &'static str,
}

/// 解码分隔文本
///
/// # 返回
/// - Err(UndecodableText): 含 NUL 字节（多为二进制文件）
pub fn decode_text(bytes: &[u8]) -> IngestResult<DecodedText> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let text = encoding
            .decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
            .ok_or(IngestError::UndecodableText)?;
        return Ok(DecodedText {
            text: text.into_owned(),
            encoding: encoding.name(),
        });
    }

    if bytes.contains(&0) {
        return Err(IngestError::UndecodableText);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedText {
            text: text.to_string(),
            encoding: encoding_rs::UTF_8.name(),
        });
    }

    if let Some(text) = GB18030.decode_without_bom_handling_and_without_replacement(bytes) {
        tracing::debug!("UTF-8 解码失败，使用 GB18030");
        return Ok(DecodedText {
            text: text.into_owned(),
            encoding: GB18030.name(),
        });
    }

    tracing::debug!("GB18030 解码失败，使用 Windows-1252");
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    Ok(DecodedText {
        text: text.into_owned(),
        encoding: WINDOWS_1252.name(),
    })
}

/// 按首个非空行（引号外）出现次数选择分隔符；无候选时为逗号
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");

    let mut counts = [(b',', 0usize), (b';', 0usize), (b'\t', 0usize)];
    let mut in_quotes = false;
    for ch in first_line.bytes() {
        if ch == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        for (sep, count) in counts.iter_mut() {
            if ch == *sep {
                *count += 1;
            }
        }
    }

    // 并列时按候选顺序优先（逗号优先）
    let mut best = (b',', 0usize);
    for (sep, count) in counts {
        if count > best.1 {
            best = (sep, count);
        }
    }
    best.0
}
