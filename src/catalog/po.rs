//! PO 文件读写
//!
//! 覆盖合并管线需要的 gettext 子集：多行字符串与转义、`#` 头注释块、
//! `#.` 提取注释、`#:` 出处引用、`#,` 标志、`#~` 过时条目，以及
//! `msgid ""` 头条目中的元数据键值对。复数形式会被解析但只保留
//! 第一个译文（管线的数据模型是单数键值对）。
//!
//! `compile_mo` 额外提供 PO → MO 的二进制编译。

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::catalog::{shared, CatalogMetadata, Entry, ParsedCatalog, SharedEntry};
use crate::error::{TranslationError, TranslationResult};

/// 解析 PO 文件
pub fn parse_file<P: AsRef<Path>>(path: P) -> TranslationResult<ParsedCatalog> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let catalog = parse_str(&content, &path.to_string_lossy())?;
    debug!("已解析 {}: {} 个条目", path.display(), catalog.len());
    Ok(catalog)
}

/// 解析 PO 文本
pub fn parse_str(content: &str, source_name: &str) -> TranslationResult<ParsedCatalog> {
    Parser::new(source_name).parse(content)
}

/// 当前正在累积的字符串目标
#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    MsgId,
    MsgStr,
    /// msgctxt、msgid_plural、msgstr[N>0] 等被解析但不保留的部分
    Discard,
}

/// 单个条目的累积状态
#[derive(Default)]
struct PendingEntry {
    msgid: String,
    msgstr: String,
    comment_lines: Vec<String>,
    translator_lines: Vec<String>,
    occurrences: Vec<(String, String)>,
    flags: Vec<String>,
    obsolete: bool,
    started: bool,
}

struct Parser {
    source_name: String,
    entries: Vec<SharedEntry>,
    metadata: CatalogMetadata,
    header: Option<String>,
    seen_header_entry: bool,
}

impl Parser {
    fn new(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            entries: Vec::new(),
            metadata: CatalogMetadata::new(),
            header: None,
            seen_header_entry: false,
        }
    }

    fn parse(mut self, content: &str) -> TranslationResult<ParsedCatalog> {
        let mut pending = PendingEntry::default();
        let mut section = Section::None;

        for (line_no, raw_line) in content.lines().enumerate() {
            let line_no = line_no + 1;
            let mut line = raw_line.trim_end();
            let mut obsolete_line = false;

            if let Some(rest) = line.strip_prefix("#~") {
                obsolete_line = true;
                line = rest.trim_start();
            }

            if line.is_empty() {
                self.flush(&mut pending)?;
                section = Section::None;
                continue;
            }

            if obsolete_line {
                pending.obsolete = true;
            }

            if let Some(rest) = line.strip_prefix("#.") {
                pending.comment_lines.push(rest.trim_start().to_string());
            } else if let Some(rest) = line.strip_prefix("#:") {
                for token in rest.split_whitespace() {
                    pending.occurrences.push(split_occurrence(token));
                }
            } else if let Some(rest) = line.strip_prefix("#,") {
                pending
                    .flags
                    .extend(rest.split(',').map(|f| f.trim().to_string()));
            } else if line.starts_with("#|") {
                // 上一版本的 msgid 引用，不参与合并
            } else if let Some(rest) = line.strip_prefix('#') {
                pending
                    .translator_lines
                    .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            } else if let Some(rest) = line.strip_prefix("msgid_plural") {
                unquote(rest.trim(), &self.source_name, line_no)?;
                section = Section::Discard;
            } else if let Some(rest) = line.strip_prefix("msgid") {
                if pending.started {
                    self.flush(&mut pending)?;
                }
                pending.started = true;
                pending.msgid = unquote(rest.trim(), &self.source_name, line_no)?;
                section = Section::MsgId;
            } else if let Some(rest) = line.strip_prefix("msgstr") {
                let rest = rest.trim_start();
                if let Some(indexed) = rest.strip_prefix('[') {
                    // msgstr[0] 保留为译文，更高的复数形式丢弃
                    let close = indexed.find(']').ok_or_else(|| {
                        TranslationError::parse(&self.source_name, line_no, "msgstr 索引未闭合")
                    })?;
                    let index = &indexed[..close];
                    let value = unquote(indexed[close + 1..].trim(), &self.source_name, line_no)?;
                    if index == "0" {
                        pending.msgstr = value;
                        section = Section::MsgStr;
                    } else {
                        section = Section::Discard;
                    }
                } else {
                    pending.msgstr = unquote(rest, &self.source_name, line_no)?;
                    section = Section::MsgStr;
                }
            } else if let Some(rest) = line.strip_prefix("msgctxt") {
                unquote(rest.trim(), &self.source_name, line_no)?;
                section = Section::Discard;
            } else if line.starts_with('"') {
                let chunk = unquote(line, &self.source_name, line_no)?;
                match section {
                    Section::MsgId => pending.msgid.push_str(&chunk),
                    Section::MsgStr => pending.msgstr.push_str(&chunk),
                    Section::Discard => {}
                    Section::None => {
                        return Err(TranslationError::parse(
                            &self.source_name,
                            line_no,
                            "孤立的字符串续行",
                        ))
                    }
                }
            } else {
                return Err(TranslationError::parse(
                    &self.source_name,
                    line_no,
                    format!("无法识别的行: {}", line),
                ));
            }
        }

        self.flush(&mut pending)?;

        Ok(ParsedCatalog {
            metadata: self.metadata,
            header: self.header,
            entries: self.entries,
        })
    }

    fn flush(&mut self, pending: &mut PendingEntry) -> TranslationResult<()> {
        let pending = std::mem::take(pending);
        if !pending.started {
            return Ok(());
        }

        if pending.msgid.is_empty() && !self.seen_header_entry {
            // 头条目：msgstr 携带元数据，前置注释是文件头
            self.seen_header_entry = true;
            for field_line in pending.msgstr.lines() {
                if let Some((key, value)) = field_line.split_once(':') {
                    self.metadata.set(key.trim(), value.trim());
                }
            }
            if !pending.translator_lines.is_empty() {
                self.header = Some(pending.translator_lines.join("\n"));
            }
            return Ok(());
        }

        let mut entry = Entry::new(pending.msgid, pending.msgstr);
        if !pending.comment_lines.is_empty() {
            entry.comment = Some(pending.comment_lines.join("\n"));
        }
        entry.occurrences = pending.occurrences;
        entry.flags = pending.flags;
        entry.obsolete = pending.obsolete;
        self.entries.push(shared(entry));
        Ok(())
    }
}

/// 拆分出处引用为 (位置, 行号)
///
/// 仅当最后一个冒号后全为数字时才视为行号；结构化出处
/// （`model:ir.model.fields,...`）整体作为位置，行号留空。
fn split_occurrence(token: &str) -> (String, String) {
    if let Some((location, line)) = token.rsplit_once(':') {
        if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
            return (location.to_string(), line.to_string());
        }
    }
    (token.to_string(), String::new())
}

fn unquote(raw: &str, source_name: &str, line_no: usize) -> TranslationResult<String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| TranslationError::parse(source_name, line_no, "字符串缺少引号"))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                // gettext 容忍未知转义，原样保留
                out.push('\\');
                out.push(other);
            }
            None => {
                return Err(TranslationError::parse(source_name, line_no, "悬空的转义符"))
            }
        }
    }
    Ok(out)
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// 将目录写出为 PO 文件
pub fn write_file<P: AsRef<Path>>(
    path: P,
    metadata: &CatalogMetadata,
    header: Option<&str>,
    entries: &[SharedEntry],
) -> TranslationResult<()> {
    let content = write_str(metadata, header, entries);
    fs::write(path.as_ref(), content)?;
    Ok(())
}

/// 将目录序列化为 PO 文本
pub fn write_str(
    metadata: &CatalogMetadata,
    header: Option<&str>,
    entries: &[SharedEntry],
) -> String {
    let mut out = String::new();

    if let Some(header) = header {
        for line in header.lines() {
            if line.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str("# ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    out.push_str("msgid \"\"\n");
    out.push_str("msgstr \"\"\n");
    for (key, value) in metadata.iter() {
        out.push_str(&quote(&format!("{}: {}\n", key, value)));
        out.push('\n');
    }

    for entry in entries {
        let entry = entry.read().unwrap_or_else(|e| e.into_inner());
        out.push('\n');
        if let Some(comment) = &entry.comment {
            for line in comment.lines() {
                out.push_str("#. ");
                out.push_str(line);
                out.push('\n');
            }
        }
        for (location, line) in &entry.occurrences {
            if line.is_empty() {
                out.push_str(&format!("#: {}\n", location));
            } else {
                out.push_str(&format!("#: {}:{}\n", location, line));
            }
        }
        if !entry.flags.is_empty() {
            out.push_str(&format!("#, {}\n", entry.flags.join(", ")));
        }
        let prefix = if entry.obsolete { "#~ " } else { "" };
        out.push_str(&format!("{}msgid {}\n", prefix, quote(&entry.msgid)));
        out.push_str(&format!("{}msgstr {}\n", prefix, quote(&entry.msgstr)));
    }

    out
}

/// 编译 PO 为 MO 二进制
///
/// 小端格式，条目按 msgid 字节序排序，头条目（空 msgid）携带元数据。
pub fn compile_mo<P: AsRef<Path>, Q: AsRef<Path>>(
    po_path: P,
    mo_path: Q,
) -> TranslationResult<()> {
    let catalog = parse_file(&po_path)?;

    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(catalog.entries.len() + 1);
    let header_value: String = catalog
        .metadata
        .iter()
        .map(|(k, v)| format!("{}: {}\n", k, v))
        .collect();
    pairs.push((Vec::new(), header_value.into_bytes()));

    for entry in &catalog.entries {
        let entry = entry.read().unwrap_or_else(|e| e.into_inner());
        if entry.obsolete {
            continue;
        }
        pairs.push((
            entry.msgid.clone().into_bytes(),
            entry.msgstr.clone().into_bytes(),
        ));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let count = pairs.len() as u32;
    let orig_table_offset = 28u32;
    let trans_table_offset = orig_table_offset + count * 8;
    let mut strings_offset = trans_table_offset + count * 8;

    let mut orig_table = Vec::with_capacity(pairs.len());
    let mut trans_table = Vec::with_capacity(pairs.len());
    let mut string_pool: Vec<u8> = Vec::new();
    for (msgid, _) in &pairs {
        orig_table.push((msgid.len() as u32, strings_offset));
        string_pool.extend_from_slice(msgid);
        string_pool.push(0);
        strings_offset += msgid.len() as u32 + 1;
    }
    for (_, msgstr) in &pairs {
        trans_table.push((msgstr.len() as u32, strings_offset));
        string_pool.extend_from_slice(msgstr);
        string_pool.push(0);
        strings_offset += msgstr.len() as u32 + 1;
    }

    let mut out: Vec<u8> = Vec::with_capacity(28 + string_pool.len() + pairs.len() * 16);
    out.extend_from_slice(&0x950412deu32.to_le_bytes()); // magic
    out.extend_from_slice(&0u32.to_le_bytes()); // 版本
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&orig_table_offset.to_le_bytes());
    out.extend_from_slice(&trans_table_offset.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // 哈希表大小
    out.extend_from_slice(&0u32.to_le_bytes()); // 哈希表偏移
    for (len, offset) in orig_table.iter().chain(trans_table.iter()) {
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
    }
    out.extend_from_slice(&string_pool);

    fs::write(mo_path.as_ref(), out)?;
    debug!(
        "已编译 {} → {} ({} 个条目)",
        po_path.as_ref().display(),
        mo_path.as_ref().display(),
        count
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"# Translation of ERP Server.
# This file contains the translation of the following modules:
#  * sale
msgid ""
msgstr ""
"Project-Id-Version: ERP Server 17.0\n"
"Content-Type: text/plain; charset=UTF-8\n"
"Language: fr\n"

#. module: sale
#: model:ir.model.fields,field_description:sale.field_sale_order__name
msgid "Order Reference"
msgstr "Référence de commande"

#. module: sale
#: code:addons/sale/models/sale.py:42
msgid "Invoice N° %(number)s"
msgstr ""

#~ msgid "Legacy label"
#~ msgstr "Ancienne étiquette"
"#;

    #[test]
    fn test_parse_sample() {
        let catalog = parse_str(SAMPLE, "sale.po").unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.metadata.get("Language"), Some("fr"));
        assert_eq!(catalog.metadata.len(), 3);
        assert!(catalog.header.as_deref().unwrap().contains("ERP Server"));

        let first = catalog.entries[0].read().unwrap();
        assert_eq!(first.msgid, "Order Reference");
        assert_eq!(first.msgstr, "Référence de commande");
        assert_eq!(first.comment.as_deref(), Some("module: sale"));
        assert_eq!(first.occurrences.len(), 1);
        // 结构化出处整体是位置，没有行号
        assert_eq!(first.occurrences[0].1, "");

        let second = catalog.entries[1].read().unwrap();
        assert_eq!(
            second.occurrences[0],
            ("code:addons/sale/models/sale.py".to_string(), "42".to_string())
        );

        let obsolete = catalog.entries[2].read().unwrap();
        assert!(obsolete.obsolete);
        assert_eq!(obsolete.msgid, "Legacy label");
    }

    #[test]
    fn test_round_trip_preserves_counts() {
        let catalog = parse_str(SAMPLE, "sale.po").unwrap();
        let non_obsolete: Vec<_> = catalog
            .entries
            .iter()
            .filter(|e| !e.read().unwrap().obsolete)
            .cloned()
            .collect();
        let written = write_str(&catalog.metadata, catalog.header.as_deref(), &non_obsolete);
        let reparsed = parse_str(&written, "rewritten.po").unwrap();

        assert_eq!(reparsed.len(), non_obsolete.len());
        assert_eq!(reparsed.metadata.len(), catalog.metadata.len());
        assert_eq!(reparsed.header, catalog.header);
    }

    #[test]
    fn test_escapes_round_trip() {
        let mut entry = Entry::new("Line1\nLine2\t\"quoted\"", "A\\B");
        entry.comment = Some("module: stock".to_string());
        let metadata = CatalogMetadata::default_export("fr");
        let written = write_str(&metadata, None, &[shared(entry)]);
        let reparsed = parse_str(&written, "escapes.po").unwrap();

        let entry = reparsed.entries[0].read().unwrap();
        assert_eq!(entry.msgid, "Line1\nLine2\t\"quoted\"");
        assert_eq!(entry.msgstr, "A\\B");
    }

    #[test]
    fn test_unterminated_string_is_parse_error() {
        let result = parse_str("msgid \"broken\n", "bad.po");
        assert!(matches!(
            result,
            Err(TranslationError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_plural_keeps_first_form() {
        let text = r#"msgid ""
msgstr ""
"Language: fr\n"

msgid "Product"
msgid_plural "Products"
msgstr[0] "Produit"
msgstr[1] "Produits"
"#;
        let catalog = parse_str(text, "plural.po").unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.entries[0].read().unwrap().msgstr, "Produit");
    }
}
