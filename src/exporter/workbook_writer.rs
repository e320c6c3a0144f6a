// ==========================================
// 教会行政数据交换系统 - 工作簿写出（.xlsx）
// ==========================================
// 结构: OOXML 最小包（内容类型 / 关系 / 工作簿 / 样式 / 各工作表）
// 单元格: 一律写为内联字符串，取值已由 RecordFormatter 格式化
// 打包: zip（Deflate）
// ==========================================

use crate::exporter::error::{ExportError, ExporterResult};
use crate::exporter::formatter::SheetData;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 工作表名最大长度
const MAX_SHEET_NAME_CHARS: usize = 31;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

pub struct WorkbookWriter;

impl WorkbookWriter {
    /// 写出多表工作簿
    pub fn write(&self, sheets: &[SheetData]) -> ExporterResult<Vec<u8>> {
        if sheets.is_empty() {
            return Err(ExportError::NothingToExport);
        }
        let names = unique_sheet_names(sheets);

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

            zip.start_file("[Content_Types].xml", options)?;
            zip.write_all(content_types(sheets.len()).as_bytes())?;

            zip.start_file("_rels/.rels", options)?;
            zip.write_all(ROOT_RELS.as_bytes())?;

            zip.start_file("xl/workbook.xml", options)?;
            zip.write_all(workbook_xml(&names).as_bytes())?;

            zip.start_file("xl/_rels/workbook.xml.rels", options)?;
            zip.write_all(workbook_rels(sheets.len()).as_bytes())?;

            zip.start_file("xl/styles.xml", options)?;
            zip.write_all(STYLES.as_bytes())?;

            for (index, sheet) in sheets.iter().enumerate() {
                zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)?;
                zip.write_all(sheet_xml(sheet).as_bytes())?;
            }

            zip.finish()?;
        }
        Ok(cursor.into_inner())
    }
}

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            index
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn workbook_xml(names: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (index, name) in names.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape_xml(name),
            index + 1,
            index + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for index in 1..=sheet_count {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{0}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{0}.xml"/>"#,
            index
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        sheet_count + 1
    ));
    xml.push_str("</Relationships>");
    xml
}

fn sheet_xml(sheet: &SheetData) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in sheet.rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            xml.push_str(&format!(
                r#"<c r="{}{}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                column_name(c),
                r + 1,
                escape_xml(value)
            ));
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// 0 → A, 25 → Z, 26 → AA
fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// XML 转义，并去掉 XML 1.0 不允许的控制字符
fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(ch),
            c if (c as u32) < 0x20 => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// 工作表名: 去掉非法字符、截断到 31 个字符、重名加序号
fn unique_sheet_names(sheets: &[SheetData]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(sheets.len());
    for (index, sheet) in sheets.iter().enumerate() {
        let cleaned: String = sheet
            .name
            .chars()
            .filter(|c| !matches!(*c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
            .take(MAX_SHEET_NAME_CHARS)
            .collect();
        let mut name = if cleaned.trim().is_empty() {
            format!("Sheet{}", index + 1)
        } else {
            cleaned
        };
        if names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
            name = format!("{}{}", name, index + 1);
        }
        names.push(name);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{Data, Reader, Xlsx};

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(27), "AB");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_name(702), "AAA");
    }

    #[test]
    fn test_workbook_is_readable() {
        let sheets = vec![
            SheetData {
                name: "成员".into(),
                rows: vec![
                    vec!["编号".into(), "姓名".into()],
                    vec!["m1".into(), "Kim & <Lee>".into()],
                ],
            },
            SheetData {
                name: "汇总信息".into(),
                rows: vec![vec!["合计".into(), "1".into()]],
            },
        ];
        let bytes = WorkbookWriter.write(&sheets).unwrap();

        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["成员".to_string(), "汇总信息".to_string()]);
        let range = workbook.worksheet_range("成员").unwrap();
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Kim & <Lee>".into())));
    }

    #[test]
    fn test_empty_workbook_rejected() {
        assert!(matches!(
            WorkbookWriter.write(&[]),
            Err(ExportError::NothingToExport)
        ));
    }
}
