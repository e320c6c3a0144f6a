// ==========================================
// 教会行政数据交换系统 - 文件解析器实现（FileIngestor）
// ==========================================
// 支持: Excel (.xlsx/.xls) / 分隔文本 (.csv/.tsv/.txt)
// 流程: 大小检查 → 格式识别（扩展名 + 文件签名）→ 解码 → 表头 → 数据行 → 类型转换
// 行号: 表头之后的数据行序号（从 1 开始），被丢弃的空行仍占行号
// ==========================================

use crate::config::InterchangeConfig;
use crate::domain::record_type::RecordType;
use crate::domain::result::{ImportError, ParsedRow, UploadResult};
use crate::domain::value::{FieldValue, Record};
use crate::importer::data_cleaner::{format_number, DataCleaner};
use crate::importer::data_importer_trait::FileParser;
use crate::importer::encoding::{decode_text, detect_delimiter};
use crate::importer::error::{IngestError, IngestResult};
use crate::importer::field_mapper::{guess_field, is_id_header};
use calamine::{Data, Reader, Xls, Xlsx};
use csv::ReaderBuilder;
use std::io::{Cursor, Read, Seek};

/// xlsx（zip 容器）文件签名
const XLSX_SIGNATURE: &[u8] = b"PK\x03\x04";
/// xls（OLE 复合文档）文件签名
const XLS_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// 按扩展名识别格式，并校验二进制签名
    pub fn detect(filename: &str, bytes: &[u8]) -> IngestResult<FileFormat> {
        let ext = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" | "tsv" | "txt" => Ok(FileFormat::Delimited),
            "xlsx" | "xlsm" => {
                if bytes.starts_with(XLSX_SIGNATURE) {
                    Ok(FileFormat::Xlsx)
                } else {
                    Err(IngestError::InvalidSignature(filename.to_string()))
                }
            }
            "xls" => {
                if bytes.starts_with(XLS_SIGNATURE) {
                    Ok(FileFormat::Xls)
                } else {
                    Err(IngestError::InvalidSignature(filename.to_string()))
                }
            }
            // 无扩展名时按签名识别
            "" if bytes.starts_with(XLSX_SIGNATURE) => Ok(FileFormat::Xlsx),
            "" if bytes.starts_with(XLS_SIGNATURE) => Ok(FileFormat::Xls),
            "" => Ok(FileFormat::Delimited),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn is_workbook(&self) -> bool {
        matches!(self, FileFormat::Xlsx | FileFormat::Xls)
    }
}

/// 文件大小与行数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestLimits {
    pub max_file_bytes: u64,
    pub max_rows: usize,
}

impl From<&InterchangeConfig> for IngestLimits {
    fn from(config: &InterchangeConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            max_rows: config.max_rows,
        }
    }
}

impl Default for IngestLimits {
    fn default() -> Self {
        IngestLimits::from(&InterchangeConfig::default())
    }
}

/// 未做类型转换的工作表
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<ParsedRow>,
}

/// 解析后的文件
#[derive(Debug, Clone, PartialEq)]
pub struct RawFile {
    pub format: FileFormat,
    /// 分隔文本实际使用的编码
    pub encoding: Option<String>,
    pub sheets: Vec<RawSheet>,
}

// ==========================================
// 表头与数据行组装（分隔文本与工作簿共用）
// ==========================================

/// 由二维单元格组装工作表
///
/// - 首行为表头；空白表头列与重复表头列被忽略
/// - 全空的数据行被丢弃，但其行号保留
fn assemble_sheet(
    name: &str,
    mut rows: impl Iterator<Item = Vec<Option<FieldValue>>>,
    max_rows: usize,
) -> IngestResult<RawSheet> {
    let header_cells = rows
        .next()
        .ok_or_else(|| IngestError::NoHeaderRow(name.to_string()))?;

    let mut headers: Vec<Option<String>> = Vec::with_capacity(header_cells.len());
    let mut kept: Vec<String> = Vec::new();
    for cell in header_cells {
        let header = cell.map(|v| v.to_string().trim().to_string()).unwrap_or_default();
        if header.is_empty() {
            headers.push(None);
        } else if kept.contains(&header) {
            tracing::warn!(sheet = name, header = %header, "重复表头，忽略后出现的列");
            headers.push(None);
        } else {
            kept.push(header.clone());
            headers.push(Some(header));
        }
    }
    if kept.is_empty() {
        return Err(IngestError::NoHeaderRow(name.to_string()));
    }

    let mut parsed = Vec::new();
    for (idx, cells) in rows.enumerate() {
        let mut values = Record::new();
        for (col, cell) in cells.into_iter().enumerate() {
            let (Some(Some(header)), Some(value)) = (headers.get(col), cell) else {
                continue;
            };
            if value.is_blank() {
                continue;
            }
            values.insert(header.clone(), value);
        }
        if values.is_empty() {
            continue;
        }
        if parsed.len() >= max_rows {
            return Err(IngestError::TooManyRows {
                rows: parsed.len() + 1,
                limit: max_rows,
            });
        }
        parsed.push(ParsedRow::new(idx + 1, values));
    }

    Ok(RawSheet {
        name: name.to_string(),
        headers: kept,
        rows: parsed,
    })
}

fn text_cell(raw: &str) -> Option<FieldValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(FieldValue::text(trimmed))
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser {
    pub max_rows: usize,
}

impl FileParser for CsvParser {
    fn parse(&self, bytes: &[u8], source_name: &str) -> IngestResult<RawFile> {
        let decoded = decode_text(bytes)?;
        if decoded.text.trim().is_empty() {
            return Err(IngestError::EmptyFile);
        }

        let delimiter = detect_delimiter(&decoded.text);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(delimiter)
            .from_reader(decoded.text.as_bytes());

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result?;
            records.push(record.iter().map(text_cell).collect::<Vec<_>>());
        }

        let sheet_name = source_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(source_name);
        let sheet = assemble_sheet(sheet_name, records.into_iter(), self.max_rows)?;
        tracing::debug!(
            encoding = decoded.encoding,
            delimiter = %(delimiter as char).escape_default(),
            rows = sheet.rows.len(),
            "分隔文本解析完成"
        );

        Ok(RawFile {
            format: FileFormat::Delimited,
            encoding: Some(decoded.encoding.to_string()),
            sheets: vec![sheet],
        })
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser {
    pub format: FileFormat,
    pub max_rows: usize,
}

impl ExcelParser {
    fn convert_cell(cell: &Data) -> Option<FieldValue> {
        let cleaner = DataCleaner;
        match cell {
            Data::Empty => None,
            Data::String(s) => text_cell(s),
            Data::Int(i) => Some(FieldValue::Integer(*i)),
            Data::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    Some(FieldValue::Integer(*f as i64))
                } else {
                    Some(FieldValue::Amount(*f))
                }
            }
            Data::Bool(b) => Some(FieldValue::Boolean(*b)),
            Data::DateTime(dt) => {
                let serial = dt.as_f64();
                Some(
                    cleaner
                        .serial_to_date(serial)
                        .map(FieldValue::Date)
                        .unwrap_or_else(|| FieldValue::text(format_number(serial))),
                )
            }
            Data::DateTimeIso(s) => Some(
                cleaner
                    .parse_date(s)
                    .map(FieldValue::Date)
                    .unwrap_or_else(|| FieldValue::text(s.trim())),
            ),
            Data::DurationIso(s) => text_cell(s),
            Data::Error(e) => Some(FieldValue::text(e.to_string())),
        }
    }

    fn read_sheets<RS, R>(&self, workbook: &mut R) -> IngestResult<Vec<RawSheet>>
    where
        RS: Read + Seek,
        R: Reader<RS>,
        R::Error: std::fmt::Display,
    {
        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(IngestError::ExcelParseError("Excel 文件无工作表".to_string()));
        }

        let mut sheets = Vec::with_capacity(sheet_names.len());
        for sheet_name in sheet_names {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| IngestError::ExcelParseError(format!("{}: {}", sheet_name, e)))?;

            let rows = range
                .rows()
                .map(|row| row.iter().map(Self::convert_cell).collect::<Vec<_>>());
            match assemble_sheet(&sheet_name, rows, self.max_rows) {
                Ok(sheet) => sheets.push(sheet),
                // 空工作表（无表头）在多表文件中跳过
                Err(IngestError::NoHeaderRow(name)) => {
                    tracing::warn!(sheet = %name, "工作表无表头，跳过");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(sheets)
    }
}

impl FileParser for ExcelParser {
    fn parse(&self, bytes: &[u8], source_name: &str) -> IngestResult<RawFile> {
        let cursor = Cursor::new(bytes.to_vec());
        let sheets = match self.format {
            FileFormat::Xls => {
                let mut workbook: Xls<_> = Xls::new(cursor)
                    .map_err(|e| IngestError::ExcelParseError(e.to_string()))?;
                self.read_sheets(&mut workbook)?
            }
            _ => {
                let mut workbook: Xlsx<_> = Xlsx::new(cursor)
                    .map_err(|e| IngestError::ExcelParseError(e.to_string()))?;
                self.read_sheets(&mut workbook)?
            }
        };

        if sheets.is_empty() {
            return Err(IngestError::NoHeaderRow(source_name.to_string()));
        }

        Ok(RawFile {
            format: self.format,
            encoding: None,
            sheets,
        })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名与签名自动选择）
// ==========================================
pub struct UniversalFileParser {
    pub limits: IngestLimits,
}

impl FileParser for UniversalFileParser {
    fn parse(&self, bytes: &[u8], source_name: &str) -> IngestResult<RawFile> {
        let size = bytes.len() as u64;
        if size > self.limits.max_file_bytes {
            return Err(IngestError::FileTooLarge {
                size,
                limit: self.limits.max_file_bytes,
            });
        }
        if bytes.is_empty() {
            return Err(IngestError::EmptyFile);
        }

        match FileFormat::detect(source_name, bytes)? {
            FileFormat::Delimited => CsvParser {
                max_rows: self.limits.max_rows,
            }
            .parse(bytes, source_name),
            format => ExcelParser {
                format,
                max_rows: self.limits.max_rows,
            }
            .parse(bytes, source_name),
        }
    }
}

// ==========================================
// FileIngestor - 读取 + 按目标记录类型做轻量类型转换
// ==========================================
pub struct FileIngestor {
    parser: UniversalFileParser,
}

impl FileIngestor {
    pub fn new(limits: IngestLimits) -> Self {
        Self {
            parser: UniversalFileParser { limits },
        }
    }

    /// 读取文件的全部工作表（不做类型转换）
    pub fn read(&self, bytes: &[u8], filename: &str) -> IngestResult<RawFile> {
        self.parser.parse(bytes, filename)
    }

    /// 读取单表文件（工作簿取第一个工作表）并转换类型
    ///
    /// # 返回
    /// - Err(EmptyFile): 只有表头、没有数据行
    pub fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
        record_type: RecordType,
    ) -> IngestResult<UploadResult> {
        let file = self.read(bytes, filename)?;
        let encoding = file.encoding.clone();
        let sheet = file
            .sheets
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::NoHeaderRow(filename.to_string()))?;
        if sheet.rows.is_empty() {
            return Err(IngestError::EmptyFile);
        }

        let mut result = self.coerce_sheet(sheet, record_type);
        result.encoding = encoding;
        Ok(result)
    }

    /// 按表头推断字段类型并转换单元格
    ///
    /// 转换失败的单元格保留原始文本，并记录一条行级错误。
    pub fn coerce_sheet(&self, sheet: RawSheet, record_type: RecordType) -> UploadResult {
        let cleaner = DataCleaner;
        let mut errors = Vec::new();
        let mut rows = Vec::with_capacity(sheet.rows.len());

        for row in sheet.rows {
            let mut values = Record::new();
            for (header, value) in row.values {
                let kind = if is_id_header(&header) {
                    None
                } else {
                    guess_field(record_type, &header)
                };
                let value = match kind {
                    Some(spec) => match cleaner.coerce(&spec.kind, value) {
                        Ok(coerced) => coerced,
                        Err(e) => {
                            let raw = FieldValue::text(e.raw());
                            errors.push(
                                ImportError::new(row.row_number, e.message())
                                    .with_field(spec.key)
                                    .with_value(raw.clone()),
                            );
                            raw
                        }
                    },
                    None => cleaner.coerce_text(value),
                };
                values.insert(header, value);
            }
            rows.push(ParsedRow::new(row.row_number, values));
        }

        UploadResult {
            rows,
            errors,
            headers: sheet.headers,
            encoding: None,
            sheet_name: Some(sheet.name),
        }
    }
}
