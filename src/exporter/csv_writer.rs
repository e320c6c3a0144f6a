// ==========================================
// 教会行政数据交换系统 - 分隔文本写出
// ==========================================
// UTF-8 BOM 前缀（表格软件按 UTF-8 打开）+ RFC 4180 引号规则
// ==========================================

use crate::exporter::error::{ExportError, ExporterResult};
use crate::exporter::formatter::SheetData;
use csv::{QuoteStyle, Terminator, WriterBuilder};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn write_csv(sheet: &SheetData) -> ExporterResult<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .flexible(true)
            .from_writer(&mut buffer);
        for row in &sheet.rows {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .map_err(|e| ExportError::CsvWriteError(e.to_string()))?;
    }
    Ok(buffer)
}
