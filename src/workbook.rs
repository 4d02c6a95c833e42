//! Minimal XLSX writer: SpreadsheetML parts zipped by hand, inline strings
//! only, bold header row.

use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const MAX_SHEET_NAME: usize = 31;

#[derive(Debug, Clone, Default)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet, making its name legal and unique within the workbook.
    pub fn add_sheet(&mut self, name: &str, header: &[&str]) -> &mut Sheet {
        let base = sheet_name(name);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&candidate)) {
            let suffix = format!(" ({})", n);
            let keep = MAX_SHEET_NAME.saturating_sub(suffix.chars().count());
            candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
            n += 1;
        }
        self.sheets.push(Sheet {
            name: candidate,
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        });
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn write_to(&self, out_path: &Path) -> anyhow::Result<usize> {
        if self.sheets.is_empty() {
            return Err(anyhow!("workbook has no sheets"));
        }
        if let Some(parent) = out_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create directory {}", parent.to_string_lossy())
                })?;
            }
        }
        let out_file = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
        let mut zip = ZipWriter::new(out_file);
        let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut parts: Vec<(String, String)> = vec![
            ("[Content_Types].xml".into(), self.content_types()),
            ("_rels/.rels".into(), ROOT_RELS.into()),
            ("xl/workbook.xml".into(), self.workbook_xml()),
            ("xl/_rels/workbook.xml.rels".into(), self.workbook_rels()),
            ("xl/styles.xml".into(), STYLES.into()),
        ];
        for (i, sheet) in self.sheets.iter().enumerate() {
            parts.push((format!("xl/worksheets/sheet{}.xml", i + 1), sheet_xml(sheet)));
        }

        for (name, body) in &parts {
            zip.start_file(name.as_str(), opts)
                .with_context(|| format!("failed to start {} entry", name))?;
            zip.write_all(body.as_bytes())
                .with_context(|| format!("failed to write {} entry", name))?;
        }
        zip.finish().context("failed to finalize workbook")?;
        Ok(self.sheets.len())
    }

    fn content_types(&self) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
        );
        for i in 1..=self.sheets.len() {
            out.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i
            ));
        }
        out.push_str("</Types>");
        out
    }

    fn workbook_xml(&self) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        for (i, sheet) in self.sheets.iter().enumerate() {
            out.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape_xml(&sheet.name),
                i + 1,
                i + 1
            ));
        }
        out.push_str("</sheets></workbook>");
        out
    }

    fn workbook_rels(&self) -> String {
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        let n = self.sheets.len();
        for i in 1..=n {
            out.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i, i
            ));
        }
        out.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
            n + 1
        ));
        out.push_str("</Relationships>");
        out
    }
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#;

fn sheet_xml(sheet: &Sheet) -> String {
    let mut out = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    let mut row_no = 1;
    if !sheet.header.is_empty() {
        push_row(&mut out, row_no, &sheet.header, true);
        row_no += 1;
    }
    for row in &sheet.rows {
        push_row(&mut out, row_no, row, false);
        row_no += 1;
    }
    out.push_str("</sheetData></worksheet>");
    out
}

fn push_row(out: &mut String, row_no: usize, cells: &[String], bold: bool) {
    out.push_str(&format!(r#"<row r="{}">"#, row_no));
    for (col, value) in cells.iter().enumerate() {
        let style = if bold { r#" s="1""# } else { "" };
        let space = if value.trim() != value {
            r#" xml:space="preserve""#
        } else {
            ""
        };
        out.push_str(&format!(
            r#"<c r="{}{}" t="inlineStr"{}><is><t{}>{}</t></is></c>"#,
            column_letter(col),
            row_no,
            style,
            space,
            escape_xml(value)
        ));
    }
    out.push_str("</row>");
}

/// 0 -> A, 25 -> Z, 26 -> AA.
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters other than tab/newline are not legal XML 1.0.
            c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Strips characters Excel rejects in sheet names and truncates to 31.
pub fn sheet_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect();
    let cleaned = cleaned.trim_matches('\'').to_string();
    if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_roll_over() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("A & B <c>"), "A &amp; B &lt;c&gt;");
        assert_eq!(escape_xml("O'Neil"), "O&apos;Neil");
        assert_eq!(escape_xml("bad\u{1}char"), "badchar");
    }

    #[test]
    fn sheet_names_are_legal_and_unique() {
        assert_eq!(sheet_name("Students_Y1st_Sa"), "Students_Y1st_Sa");
        assert_eq!(sheet_name("a/b:c"), "abc");
        assert_eq!(sheet_name(&"x".repeat(40)).len(), 31);

        let mut wb = Workbook::new();
        wb.add_sheet("Teachers", &["First Name"]);
        let dup = wb.add_sheet("teachers", &["First Name"]);
        assert_eq!(dup.name, "teachers (2)");
    }
}
