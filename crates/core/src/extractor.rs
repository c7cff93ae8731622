use crate::bbox::is_contained;
use crate::error::IngestError;
use crate::models::{BBox, PageLayout, TableRegion, WordToken};
use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::warn;

const DEFAULT_PAGE_HEIGHT: f64 = 792.0;
const GLYPH_WIDTH_EM: f64 = 0.5;
const EDGE_TOLERANCE: f64 = 1.0;
const MIN_CELL_SIDE: f64 = 2.0;
const KERNING_WORD_BREAK: f64 = 250.0;

pub trait LayoutExtractor {
    fn extract_layouts(&self, path: &Path) -> Result<Vec<PageLayout>, IngestError>;
}

/// Reads word positions and ruled table cells straight from page content streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLayoutExtractor;

impl LayoutExtractor for LopdfLayoutExtractor {
    fn extract_layouts(&self, path: &Path) -> Result<Vec<PageLayout>, IngestError> {
        let document = Document::load(path)?;
        let cmap_parser = CmapParser::new()?;

        let mut layouts = Vec::new();
        for (page_no, page_id) in document.get_pages() {
            let height = page_height(&document, page_id);
            let fonts = page_fonts(&document, page_id, &cmap_parser);
            let content = document.get_and_decode_page_content(page_id)?;
            let scan = scan_operations(&content.operations, height, &fonts);

            if fonts.values().any(|font| matches!(font, FontDecoder::Opaque)) {
                warn!(
                    path = %path.display(),
                    page = page_no,
                    "composite font without ToUnicode map, its text is skipped"
                );
            }

            let mut words = scan.words;
            let lopdf_decodable = fonts
                .values()
                .all(|font| matches!(font, FontDecoder::Simple(_)));
            if words.is_empty() && lopdf_decodable {
                words = fallback_words(&document, page_no)?;
            }

            let tables = detect_tables(&scan.rects, &words, height);
            layouts.push(PageLayout {
                number: page_no,
                words,
                tables,
            });
        }

        Ok(layouts)
    }
}

pub fn extract_page_layouts(path: &Path) -> Result<Vec<PageLayout>, IngestError> {
    LopdfLayoutExtractor.extract_layouts(path)
}

/// Pages whose operators defeat positional decoding still yield their text,
/// placed outside every table so it counts as flow content. Only used when
/// every page font is a simple font that lopdf can decode.
fn fallback_words(document: &Document, page_no: u32) -> Result<Vec<WordToken>, IngestError> {
    let text = document.extract_text(&[page_no])?;
    let offscreen = BBox::new(-1.0, -1.0, -1.0, -1.0);

    Ok(text
        .split_whitespace()
        .map(|word| word.chars().filter(|ch| !ch.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .map(|text| WordToken {
            text,
            bbox: offscreen,
        })
        .collect())
}

/// How the bytes of a text-show operand turn into characters for one font.
#[derive(Debug, Clone, PartialEq)]
enum FontDecoder {
    /// Single-byte font read through its named base encoding.
    Simple(String),
    /// Codes of `code_bytes` bytes mapped through a ToUnicode CMap.
    Cmap {
        code_bytes: usize,
        map: HashMap<u32, String>,
    },
    /// Composite font with no usable ToUnicode map.
    Opaque,
}

impl FontDecoder {
    fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FontDecoder::Simple(encoding) => Document::decode_text(Some(encoding.as_str()), bytes),
            FontDecoder::Cmap { code_bytes, map } => bytes
                .chunks(*code_bytes)
                .filter_map(|code| map.get(&code_value(code)))
                .map(String::as_str)
                .collect(),
            FontDecoder::Opaque => String::new(),
        }
    }
}

fn page_fonts(
    document: &Document,
    page_id: ObjectId,
    cmap_parser: &CmapParser,
) -> BTreeMap<Vec<u8>, FontDecoder> {
    document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font_decoder(document, font, cmap_parser)))
        .collect()
}

fn font_decoder(document: &Document, font: &Dictionary, cmap_parser: &CmapParser) -> FontDecoder {
    let to_unicode = font
        .get(b"ToUnicode")
        .ok()
        .and_then(|object| resolve(document, object).as_stream().ok())
        .map(|stream| {
            stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone())
        })
        .and_then(|content| cmap_parser.parse(&String::from_utf8_lossy(&content)));

    if let Some(decoder) = to_unicode {
        return decoder;
    }

    let composite = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice());
    if composite {
        return FontDecoder::Opaque;
    }

    FontDecoder::Simple(font.get_font_encoding().to_string())
}

fn code_value(code: &[u8]) -> u32 {
    code.iter().fold(0, |value, byte| (value << 8) | u32::from(*byte))
}

fn hex_bytes(hex: &str) -> Vec<u8> {
    let digits = hex.as_bytes();
    digits
        .chunks(2)
        .filter_map(|pair| {
            let high = char::from(pair[0]).to_digit(16)?;
            let low = match pair.get(1) {
                Some(digit) => char::from(*digit).to_digit(16)?,
                None => 0,
            };
            u8::try_from(high * 16 + low).ok()
        })
        .collect()
}

fn utf16_units(hex: &str) -> Vec<u16> {
    hex_bytes(hex)
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

const MAX_CMAP_RANGE: u32 = 0xFFFF;

/// Reads the `bfchar` and `bfrange` sections of a ToUnicode CMap.
struct CmapParser {
    bfchar_section: Regex,
    bfrange_section: Regex,
    char_entry: Regex,
    range_entry: Regex,
    hex_string: Regex,
}

impl CmapParser {
    fn new() -> Result<Self, IngestError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|error| IngestError::InvalidArgument(error.to_string()))
        };

        Ok(Self {
            bfchar_section: compile(r"(?s)beginbfchar(.*?)endbfchar")?,
            bfrange_section: compile(r"(?s)beginbfrange(.*?)endbfrange")?,
            char_entry: compile(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>")?,
            range_entry: compile(
                r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]*)>|\[([^\]]*)\])",
            )?,
            hex_string: compile(r"<([0-9A-Fa-f]*)>")?,
        })
    }

    fn parse(&self, cmap: &str) -> Option<FontDecoder> {
        let mut map = HashMap::new();
        let mut code_bytes = 0;

        for section in self.bfchar_section.captures_iter(cmap) {
            for entry in self.char_entry.captures_iter(&section[1]) {
                let source = hex_bytes(&entry[1]);
                code_bytes = code_bytes.max(source.len());
                map.insert(
                    code_value(&source),
                    String::from_utf16_lossy(&utf16_units(&entry[2])),
                );
            }
        }

        for section in self.bfrange_section.captures_iter(cmap) {
            for entry in self.range_entry.captures_iter(&section[1]) {
                let low_bytes = hex_bytes(&entry[1]);
                code_bytes = code_bytes.max(low_bytes.len());
                let low = code_value(&low_bytes);
                let high = code_value(&hex_bytes(&entry[2]));
                if high < low || high - low > MAX_CMAP_RANGE {
                    continue;
                }

                if let Some(destination) = entry.get(3) {
                    let base = utf16_units(destination.as_str());
                    for (offset, code) in (low..=high).enumerate() {
                        let mut units = base.clone();
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(offset as u16);
                        }
                        map.insert(code, String::from_utf16_lossy(&units));
                    }
                } else if let Some(list) = entry.get(4) {
                    let destinations = self.hex_string.captures_iter(list.as_str());
                    for (code, destination) in (low..=high).zip(destinations) {
                        map.insert(code, String::from_utf16_lossy(&utf16_units(&destination[1])));
                    }
                }
            }
        }

        if map.is_empty() || code_bytes == 0 {
            return None;
        }
        Some(FontDecoder::Cmap { code_bytes, map })
    }
}

fn page_height(document: &Document, page_id: ObjectId) -> f64 {
    let mut current = Some(page_id);
    let mut hops = 0;

    while let Some(id) = current {
        if hops > 32 {
            break;
        }
        hops += 1;

        let Ok(dictionary) = document.get_dictionary(id) else {
            break;
        };

        if let Ok(media_box) = dictionary.get(b"MediaBox") {
            let values = match resolve(document, media_box) {
                Object::Array(values) => values
                    .iter()
                    .filter_map(|value| number(resolve(document, value)))
                    .collect::<Vec<_>>(),
                _ => Vec::new(),
            };
            if values.len() == 4 {
                return (values[3] - values[1]).abs();
            }
        }

        current = dictionary
            .get(b"Parent")
            .ok()
            .and_then(|parent| parent.as_reference().ok());
    }

    DEFAULT_PAGE_HEIGHT
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn operand(operation: &Operation, index: usize) -> f64 {
    operation
        .operands
        .get(index)
        .and_then(number)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Matrix {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operation: &Operation) -> Matrix {
        Matrix([
            operand(operation, 0),
            operand(operation, 1),
            operand(operation, 2),
            operand(operation, 3),
            operand(operation, 4),
            operand(operation, 5),
        ])
    }

    /// `self × other` in the row-vector convention PDF uses.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

#[derive(Debug, Default)]
struct ContentScan {
    words: Vec<WordToken>,
    rects: Vec<BBox>,
}

struct TextState<'a> {
    fonts: &'a BTreeMap<Vec<u8>, FontDecoder>,
    font: Option<&'a FontDecoder>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f64,
    leading: f64,
    page_height: f64,
    pending: Option<WordToken>,
    words: Vec<WordToken>,
}

impl<'a> TextState<'a> {
    fn new(page_height: f64, fonts: &'a BTreeMap<Vec<u8>, FontDecoder>) -> Self {
        Self {
            fonts,
            font: None,
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 0.0,
            leading: 0.0,
            page_height,
            pending: None,
            words: Vec::new(),
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = Matrix::translation(tx, ty).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, tx: f64) {
        self.text_matrix = Matrix::translation(tx, 0.0).then(&self.text_matrix);
    }

    fn select_font(&mut self, operation: &Operation) {
        let fonts = self.fonts;
        self.font = operation
            .operands
            .first()
            .and_then(|name| name.as_name().ok())
            .and_then(|name| fonts.get(name));
        self.font_size = operand(operation, 1);
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = match self.font {
            Some(font) => font.decode(bytes),
            None => decode_pdf_string(bytes),
        };

        for ch in text.chars() {
            let advance = GLYPH_WIDTH_EM * self.font_size;
            if ch.is_whitespace() {
                self.flush();
            } else if !ch.is_control() {
                self.place_glyph(ch, advance);
            }
            self.advance(advance);
        }
    }

    fn place_glyph(&mut self, ch: char, advance: f64) {
        let rendering = self.text_matrix.then(&self.ctm);
        let (start_x, baseline) = rendering.apply(0.0, 0.0);
        let (end_x, _) = rendering.apply(advance, 0.0);
        let (_, cap) = rendering.apply(0.0, self.font_size);
        let glyph_height = (cap - baseline).abs();

        let glyph = BBox::new(
            start_x.min(end_x),
            self.page_height - (baseline + glyph_height),
            start_x.max(end_x),
            self.page_height - baseline,
        );

        let tolerance = 0.1 * glyph_height.max(1.0);
        let continues_word = self.pending.as_ref().is_some_and(|word| {
            (word.bbox.bottom - glyph.bottom).abs() <= tolerance
                && (glyph.x0 - word.bbox.x1).abs() <= tolerance
        });

        if continues_word {
            if let Some(word) = self.pending.as_mut() {
                word.text.push(ch);
                word.bbox = word.bbox.union(&glyph);
            }
            return;
        }

        self.flush();
        self.pending = Some(WordToken {
            text: ch.to_string(),
            bbox: glyph,
        });
    }

    fn flush(&mut self) {
        if let Some(word) = self.pending.take() {
            self.words.push(word);
        }
    }
}

fn scan_operations(
    operations: &[Operation],
    page_height: f64,
    fonts: &BTreeMap<Vec<u8>, FontDecoder>,
) -> ContentScan {
    let mut state = TextState::new(page_height, fonts);
    let mut rects = Vec::new();

    for operation in operations {
        match operation.operator.as_str() {
            "q" => state.saved.push(state.ctm),
            "Q" => {
                if let Some(ctm) = state.saved.pop() {
                    state.ctm = ctm;
                }
            }
            "cm" => state.ctm = Matrix::from_operands(operation).then(&state.ctm),
            "re" => {
                let (x, y) = (operand(operation, 0), operand(operation, 1));
                let (w, h) = (operand(operation, 2), operand(operation, 3));
                let (ax, ay) = state.ctm.apply(x, y);
                let (bx, by) = state.ctm.apply(x + w, y + h);
                rects.push(BBox::new(
                    ax.min(bx),
                    page_height - ay.max(by),
                    ax.max(bx),
                    page_height - ay.min(by),
                ));
            }
            "BT" => {
                state.flush();
                state.text_matrix = Matrix::IDENTITY;
                state.line_matrix = Matrix::IDENTITY;
            }
            "ET" => state.flush(),
            "Tf" => state.select_font(operation),
            "TL" => state.leading = operand(operation, 0),
            "Td" => state.move_line(operand(operation, 0), operand(operation, 1)),
            "TD" => {
                state.leading = -operand(operation, 1);
                state.move_line(operand(operation, 0), operand(operation, 1));
            }
            "Tm" => {
                state.line_matrix = Matrix::from_operands(operation);
                state.text_matrix = state.line_matrix;
            }
            "T*" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
            }
            "Tj" => show_operand(&mut state, operation.operands.first()),
            "'" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
                show_operand(&mut state, operation.operands.first());
            }
            "\"" => {
                let leading = state.leading;
                state.move_line(0.0, -leading);
                show_operand(&mut state, operation.operands.get(2));
            }
            "TJ" => {
                let Some(Object::Array(items)) = operation.operands.first() else {
                    continue;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => state.show(bytes),
                        other => {
                            if let Some(adjustment) = number(other) {
                                if adjustment <= -KERNING_WORD_BREAK {
                                    state.flush();
                                }
                                state.advance(-adjustment / 1000.0 * state.font_size);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    state.flush();
    ContentScan {
        words: state.words,
        rects,
    }
}

fn show_operand(state: &mut TextState, operand: Option<&Object>) {
    if let Some(Object::String(bytes, _)) = operand {
        state.show(bytes);
    }
}

fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let units = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|byte| *byte as char).collect()
}

/// Groups touching cell rectangles into tables and fills each grid cell with
/// the words it encloses.
fn detect_tables(rects: &[BBox], words: &[WordToken], page_height: f64) -> Vec<TableRegion> {
    let mut candidates: Vec<BBox> = Vec::new();
    for rect in rects
        .iter()
        .filter(|rect| rect.width() >= MIN_CELL_SIDE && rect.height() >= MIN_CELL_SIDE)
        .filter(|rect| rect.height() < 0.9 * page_height)
    {
        // A box that is filled and then stroked is painted twice.
        if !candidates.iter().any(|kept| same_rect(kept, rect)) {
            candidates.push(*rect);
        }
    }

    let mut group_of = (0..candidates.len()).collect::<Vec<_>>();
    for left in 0..candidates.len() {
        for right in (left + 1)..candidates.len() {
            if touches(&candidates[left], &candidates[right]) {
                let from = group_of[right];
                let into = group_of[left];
                for group in group_of.iter_mut() {
                    if *group == from {
                        *group = into;
                    }
                }
            }
        }
    }

    let mut group_ids = group_of.clone();
    group_ids.sort_unstable();
    group_ids.dedup();

    let mut tables = Vec::new();
    for group_id in group_ids {
        let members = candidates
            .iter()
            .zip(group_of.iter())
            .filter(|(_, group)| **group == group_id)
            .map(|(rect, _)| *rect)
            .collect::<Vec<_>>();

        let cells = members
            .iter()
            .enumerate()
            .filter(|(index, rect)| {
                !members.iter().enumerate().any(|(other, inner)| {
                    other != *index && inner != *rect && is_contained(inner, rect)
                })
            })
            .map(|(_, rect)| *rect)
            .collect::<Vec<_>>();

        if cells.len() < 2 {
            continue;
        }

        tables.push(build_grid(&cells, words));
    }

    tables.sort_by(|left, right| {
        left.bbox
            .top
            .total_cmp(&right.bbox.top)
            .then(left.bbox.x0.total_cmp(&right.bbox.x0))
    });
    tables
}

fn same_rect(left: &BBox, right: &BBox) -> bool {
    (left.x0 - right.x0).abs() <= EDGE_TOLERANCE
        && (left.top - right.top).abs() <= EDGE_TOLERANCE
        && (left.x1 - right.x1).abs() <= EDGE_TOLERANCE
        && (left.bottom - right.bottom).abs() <= EDGE_TOLERANCE
}

fn touches(left: &BBox, right: &BBox) -> bool {
    left.x0 <= right.x1 + EDGE_TOLERANCE
        && right.x0 <= left.x1 + EDGE_TOLERANCE
        && left.top <= right.bottom + EDGE_TOLERANCE
        && right.top <= left.bottom + EDGE_TOLERANCE
}

fn build_grid(cells: &[BBox], words: &[WordToken]) -> TableRegion {
    let row_edges = cluster(cells.iter().map(|cell| cell.top));
    let column_edges = cluster(cells.iter().map(|cell| cell.x0));

    let mut rows = vec![vec![None; column_edges.len()]; row_edges.len()];
    let mut bbox = cells[0];

    for cell in cells {
        bbox = bbox.union(cell);
        let (Some(row), Some(column)) = (
            edge_index(&row_edges, cell.top),
            edge_index(&column_edges, cell.x0),
        ) else {
            continue;
        };

        let text = words
            .iter()
            .filter(|word| {
                let center_x = (word.bbox.x0 + word.bbox.x1) / 2.0;
                let center_y = (word.bbox.top + word.bbox.bottom) / 2.0;
                center_x >= cell.x0
                    && center_x <= cell.x1
                    && center_y >= cell.top
                    && center_y <= cell.bottom
            })
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        rows[row][column] = Some(text);
    }

    TableRegion { bbox, rows }
}

fn cluster(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut sorted = values.collect::<Vec<_>>();
    sorted.sort_by(f64::total_cmp);

    let mut edges: Vec<f64> = Vec::new();
    for value in sorted {
        match edges.last() {
            Some(last) if (value - last).abs() <= EDGE_TOLERANCE => {}
            _ => edges.push(value),
        }
    }
    edges
}

fn edge_index(edges: &[f64], value: f64) -> Option<usize> {
    edges
        .iter()
        .position(|edge| (edge - value).abs() <= EDGE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{text_block, write_pdf, write_pdf_with_font};
    use lopdf::{dictionary, Stream, StringFormat};
    use tempfile::tempdir;

    const IDENTITY_TO_UNICODE: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
3 beginbfchar
<0001> <0052>
<0002> <0065>
<0003> <0076>
endbfchar
1 beginbfrange
<0004> <0005> [<006E> <0075>]
endbfrange
endcmap
end
end
";

    /// Type0 font over Identity-H, with an optional ToUnicode map.
    fn identity_h_font(doc: &mut Document, to_unicode: Option<&str>) -> ObjectId {
        let descendant = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "Helvetica",
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
        });

        let mut font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "Helvetica",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![descendant.into()],
        };
        if let Some(cmap) = to_unicode {
            let stream_id = doc.add_object(Stream::new(dictionary! {}, cmap.as_bytes().to_vec()));
            font.set("ToUnicode", stream_id);
        }
        doc.add_object(font)
    }

    fn two_byte_show(codes: &[u16]) -> Vec<Operation> {
        let bytes = codes.iter().flat_map(|code| code.to_be_bytes()).collect::<Vec<_>>();
        vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::String(bytes, StringFormat::Hexadecimal)]),
            Operation::new("ET", vec![]),
        ]
    }

    fn word_texts(layout: &PageLayout) -> Vec<&str> {
        layout.words.iter().map(|word| word.text.as_str()).collect()
    }

    #[test]
    fn words_and_ruled_table_are_extracted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("report.pdf");

        let mut operations = text_block(72, 700, 12, "Revenue grew");
        operations.push(Operation::new(
            "re",
            vec![100.into(), 500.into(), 100.into(), 20.into()],
        ));
        operations.push(Operation::new(
            "re",
            vec![200.into(), 500.into(), 100.into(), 20.into()],
        ));
        operations.push(Operation::new("S", vec![]));
        operations.extend(text_block(110, 505, 10, "Q1"));
        operations.extend(text_block(210, 505, 10, "42"));
        write_pdf(&path, operations)?;

        let layouts = extract_page_layouts(&path)?;
        assert_eq!(layouts.len(), 1);

        let page = &layouts[0];
        assert_eq!(page.number, 1);
        let texts = page
            .words
            .iter()
            .map(|word| word.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["Revenue", "grew", "Q1", "42"]);

        assert_eq!(page.tables.len(), 1);
        let table = &page.tables[0];
        assert_eq!(table.bbox, BBox::new(100.0, 322.0, 300.0, 342.0));
        assert_eq!(
            table.rows,
            vec![vec![Some("Q1".to_string()), Some("42".to_string())]]
        );
        Ok(())
    }

    #[test]
    fn corrupt_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_page_layouts(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn lone_frame_is_not_a_table() {
        let rects = vec![BBox::new(10.0, 10.0, 200.0, 100.0)];
        assert!(detect_tables(&rects, &[], 842.0).is_empty());
    }

    #[test]
    fn frame_painted_twice_is_not_a_table() {
        let frame = BBox::new(10.0, 10.0, 200.0, 100.0);
        let nearly_same = BBox::new(10.4, 9.8, 200.3, 100.0);
        let words = vec![WordToken {
            text: "callout".to_string(),
            bbox: BBox::new(50.0, 40.0, 90.0, 52.0),
        }];

        assert!(detect_tables(&[frame, frame], &words, 842.0).is_empty());
        assert!(detect_tables(&[frame, nearly_same], &words, 842.0).is_empty());
    }

    #[test]
    fn doubled_cells_still_form_one_grid() {
        let left = BBox::new(0.0, 0.0, 50.0, 20.0);
        let right = BBox::new(50.0, 0.0, 100.0, 20.0);
        let tables = detect_tables(&[left, right, left, right], &[], 842.0);

        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].rows,
            vec![vec![Some(String::new()), Some(String::new())]]
        );
    }

    #[test]
    fn enclosing_border_does_not_become_a_cell() {
        let rects = vec![
            BBox::new(0.0, 0.0, 100.0, 40.0),
            BBox::new(0.0, 0.0, 50.0, 20.0),
            BBox::new(50.0, 0.0, 100.0, 20.0),
            BBox::new(0.0, 20.0, 50.0, 40.0),
        ];
        let tables = detect_tables(&rects, &[], 842.0);

        assert_eq!(tables.len(), 1);
        assert_eq!(
            tables[0].rows,
            vec![
                vec![Some(String::new()), Some(String::new())],
                vec![Some(String::new()), None],
            ]
        );
    }

    #[test]
    fn type0_text_is_decoded_through_to_unicode() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("cid.pdf");
        write_pdf_with_font(&path, two_byte_show(&[1, 2, 3, 2, 4, 5, 2]), |doc| {
            identity_h_font(doc, Some(IDENTITY_TO_UNICODE))
        })?;

        let layouts = extract_page_layouts(&path)?;
        assert_eq!(word_texts(&layouts[0]), vec!["Revenue"]);
        Ok(())
    }

    #[test]
    fn type0_text_without_map_is_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("cid.pdf");
        write_pdf_with_font(&path, two_byte_show(&[1, 2, 3]), |doc| identity_h_font(doc, None))?;

        let layouts = extract_page_layouts(&path)?;
        assert!(layouts[0].words.is_empty());
        Ok(())
    }

    #[test]
    fn control_characters_never_become_words() {
        let fonts = BTreeMap::new();
        let operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F9".into(), 12.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(vec![0, 1, 0, 2, b'o', b'k'], StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ];

        let scan = scan_operations(&operations, 842.0, &fonts);
        let texts = scan.words.iter().map(|word| word.text.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["ok"]);
    }

    #[test]
    fn cmap_ranges_and_single_codes_are_read() -> Result<(), IngestError> {
        let parser = CmapParser::new()?;
        let cmap = "2 beginbfchar\n<03> <0041>\n<04> <00660069>\nendbfchar\n\
                    1 beginbfrange\n<10> <12> <0061>\nendbfrange\n";

        let Some(decoder) = parser.parse(cmap) else {
            panic!("cmap should parse");
        };
        assert_eq!(decoder.decode(&[0x03, 0x10, 0x11, 0x12, 0x04, 0x7F]), "Aabcfi");
        assert!(parser.parse("no mappings here").is_none());
        Ok(())
    }

    #[test]
    fn utf16_strings_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE9];
        assert_eq!(decode_pdf_string(&bytes), "Aé");
    }
}
