use crate::models::{BBox, TableRegion, WordToken};

/// Closed containment: every edge of `word` lies on or inside `region`.
pub fn is_contained(word: &BBox, region: &BBox) -> bool {
    word.x0 >= region.x0
        && word.x1 <= region.x1
        && word.top >= region.top
        && word.bottom <= region.bottom
}

/// A word is table content when any table on the page encloses it.
pub fn is_table_content(word: &WordToken, tables: &[TableRegion]) -> bool {
    tables
        .iter()
        .any(|table| is_contained(&word.bbox, &table.bbox))
}

pub fn flow_words<'a>(
    words: &'a [WordToken],
    tables: &'a [TableRegion],
) -> impl Iterator<Item = &'a WordToken> + 'a {
    words
        .iter()
        .filter(move |word| !is_table_content(word, tables))
}
