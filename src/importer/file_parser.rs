// ==========================================
// 合作社后台 - 文件解析器实现
// ==========================================
// 支持: Excel (.xlsx) / CSV (.csv)，按文件扩展名选择
// 输入: 上传文件的字节内容 + 列结构
// 输出: ParsedSheet（保留单元格网格，rows() 每次从首个数据行重新映射）
// ==========================================

use crate::domain::batch::{RawRow, RawValue};
use crate::importer::data_cleaner::serial_to_date;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::WorkbookParser;
use crate::importer::schema::{ColumnKind, ColumnSpec};
use calamine::{Data, Reader, Xlsx};
use csv::ReaderBuilder;
use std::io::Cursor;

/// 源文件中的一行（单元格按源列顺序）
#[derive(Debug, Clone)]
pub(crate) struct SourceRow {
    pub row_number: usize,
    pub cells: Vec<RawValue>,
}

// ==========================================
// ParsedSheet - 解析结果
// ==========================================
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    // 列结构 → 源列下标（可选列缺失时为 None）
    columns: Vec<(ColumnSpec, Option<usize>)>,
    // 非空白数据行
    grid: Vec<SourceRow>,
}

impl ParsedSheet {
    /// 由表头与数据网格构建，校验必需列并跳过空白行
    pub(crate) fn from_grid(
        headers: Vec<String>,
        rows: Vec<SourceRow>,
        schema: &[ColumnSpec],
    ) -> ImportResult<Self> {
        if headers.iter().all(|h| h.is_empty()) && rows.is_empty() {
            return Err(ImportError::EmptyFile);
        }

        let columns: Vec<(ColumnSpec, Option<usize>)> = schema
            .iter()
            .map(|spec| (*spec, headers.iter().position(|h| h == spec.name)))
            .collect();

        let missing: Vec<String> = columns
            .iter()
            .filter(|(spec, idx)| !spec.optional && idx.is_none())
            .map(|(spec, _)| spec.name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns { missing });
        }

        let grid: Vec<SourceRow> = rows
            .into_iter()
            .filter(|row| !row.cells.iter().all(RawValue::is_empty))
            .collect();
        if grid.is_empty() {
            return Err(ImportError::EmptyFile);
        }

        Ok(Self { columns, grid })
    }

    /// 数据行数（不含表头与空白行）
    pub fn len(&self) -> usize {
        self.grid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    /// 惰性映射数据行；每次调用都从首个数据行开始
    pub fn rows(&self) -> impl Iterator<Item = RawRow> + '_ {
        self.grid.iter().map(move |source| {
            let mut row = RawRow::new(source.row_number);
            for (spec, idx) in &self.columns {
                let value = idx
                    .and_then(|i| source.cells.get(i))
                    .map(|cell| normalize_cell(cell, spec.kind))
                    .unwrap_or(RawValue::Empty);
                row.cells.insert(spec.name.to_string(), value);
            }
            row
        })
    }
}

/// 单元格规范化：文本去首尾空白；日期列中的序列号转为 YYYY-MM-DD
fn normalize_cell(cell: &RawValue, kind: ColumnKind) -> RawValue {
    match cell {
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                RawValue::Empty
            } else {
                RawValue::Text(trimmed.to_string())
            }
        }
        RawValue::Number(n) if kind == ColumnKind::Date => match serial_to_date(*n) {
            Some(date) => RawValue::Text(date.format("%Y-%m-%d").to_string()),
            None => RawValue::Number(*n),
        },
        other => other.clone(),
    }
}

fn text_cell(value: &str) -> RawValue {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        RawValue::Empty
    } else {
        RawValue::Text(trimmed.to_string())
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl WorkbookParser for CsvParser {
    fn parse_bytes(&self, bytes: &[u8], schema: &[ColumnSpec]) -> ImportResult<ParsedSheet> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(bytes);

        // 读取表头（去除 UTF-8 BOM）
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let record = result?;
            let row_number = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);
            rows.push(SourceRow {
                row_number,
                cells: record.iter().map(text_cell).collect(),
            });
        }

        ParsedSheet::from_grid(headers, rows, schema)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl WorkbookParser for ExcelParser {
    fn parse_bytes(&self, bytes: &[u8], schema: &[ColumnSpec]) -> ImportResult<ParsedSheet> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

        // 只读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(ImportError::NoSheet)?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // calamine 的区域从首个非空行开始；表头前有空行即视为结构错误
        let header_offset = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        if header_offset != 0 {
            return Err(ImportError::HeaderNotOnFirstRow {
                row: header_offset + 1,
            });
        }

        let mut source_rows = range.rows();
        let headers: Vec<String> = match source_rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| cell.to_string().trim().to_string())
                .collect(),
            None => return Err(ImportError::EmptyFile),
        };

        let rows = source_rows
            .enumerate()
            .map(|(idx, cells)| SourceRow {
                row_number: idx + 2,
                cells: cells.iter().map(convert_excel_cell).collect(),
            })
            .collect();

        ParsedSheet::from_grid(headers, rows, schema)
    }
}

/// calamine 单元格 → RawValue；日期时间单元格直接转为 YYYY-MM-DD
fn convert_excel_cell(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) => text_cell(s),
        Data::Float(f) => RawValue::Number(*f),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Bool(b) => RawValue::Text(b.to_string()),
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(date) => RawValue::Text(date.format("%Y-%m-%d").to_string()),
            None => RawValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => text_cell(s.get(..10).unwrap_or(s.as_str())),
        Data::DurationIso(s) => text_cell(s),
        Data::Error(e) => RawValue::Text(e.to_string()),
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse(
        &self,
        file_name: &str,
        bytes: &[u8],
        schema: &[ColumnSpec],
    ) -> ImportResult<ParsedSheet> {
        let ext = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse_bytes(bytes, schema),
            "xlsx" => ExcelParser.parse_bytes(bytes, schema),
            _ => Err(ImportError::UnsupportedFormat(if ext.is_empty() {
                file_name.to_string()
            } else {
                ext
            })),
        }
    }
}
