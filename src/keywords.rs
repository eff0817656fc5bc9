use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use imageproc::point::Point;
use log::warn;

use crate::layout::LayoutDocument;

/// Case-folded anchor text → corners of the word's bounding polygon.
pub type AnchorMap = BTreeMap<String, [Point<f64>; 4]>;

/// Shortest word considered a usable anchor by `unique_anchor_words`.
pub const DEFAULT_MIN_ANCHOR_LENGTH: usize = 4;

pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Locates every anchor word in a layout document.
///
/// Matching is case-insensitive. An anchor text that occurs more than once
/// in the document is an ambiguous landmark and is left out of the result.
pub fn find_anchor_words(document: &LayoutDocument, anchors: &[String]) -> AnchorMap {
    let (mut found, duplicates) = scan_anchor_words(document, anchors);
    for text in duplicates {
        warn!("anchor word '{}' occurs more than once and was excluded", text);
        found.remove(&text);
    }
    found
}

/// Last occurrence of every wanted anchor, plus the anchors seen more than
/// once.
fn scan_anchor_words(document: &LayoutDocument, anchors: &[String]) -> (AnchorMap, BTreeSet<String>) {
    let wanted = anchors.iter().map(|a| fold_case(a)).collect::<HashSet<_>>();

    let mut found = AnchorMap::new();
    let mut duplicates = BTreeSet::new();
    for word in document.words() {
        let text = fold_case(&word.text);
        if !wanted.contains(&text) {
            continue;
        }
        let polygon = word.bounding_polygon.map(Point::<f64>::from);
        if found.insert(text.clone(), polygon).is_some() {
            duplicates.insert(text);
        }
    }
    (found, duplicates)
}

/// Lists the case-folded words that occur exactly once in a document and are
/// at least `min_length` characters long, in order of first appearance.
/// These are the natural anchor candidates for a reference ballot.
pub fn unique_anchor_words(document: &LayoutDocument, min_length: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order = vec![];
    for word in document.words() {
        let text = fold_case(&word.text);
        let count = counts.entry(text.clone()).or_insert(0);
        if *count == 0 {
            order.push(text);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter(|text| counts[text] == 1 && text.chars().count() >= min_length)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::document_with_words;

    fn anchors(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_find_anchor_words_is_case_insensitive() {
        let document = document_with_words(&[
            ("Всероссийская", (10.0, 20.0, 100.0, 15.0)),
            ("Ballot", (10.0, 50.0, 40.0, 15.0)),
            ("ignored", (10.0, 80.0, 40.0, 15.0)),
        ]);
        let found = find_anchor_words(&document, &anchors(&["всероссийская", "BALLOT", "absent"]));

        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["ballot", "всероссийская"]);
        let polygon = found["ballot"];
        assert_eq!(polygon[0], Point::new(10.0, 50.0));
        assert_eq!(polygon[2], Point::new(50.0, 65.0));
    }

    #[test]
    fn test_duplicate_anchor_words_are_dropped() {
        let document = document_with_words(&[
            ("Special", (10.0, 20.0, 40.0, 15.0)),
            ("special", (200.0, 300.0, 40.0, 15.0)),
            ("region", (10.0, 80.0, 40.0, 15.0)),
        ]);
        let found = find_anchor_words(&document, &anchors(&["special", "region"]));
        assert_eq!(found.keys().collect::<Vec<_>>(), vec!["region"]);
    }

    #[test]
    fn test_duplicate_anchor_words_are_sorted() {
        let document = document_with_words(&[
            ("Zone", (10.0, 20.0, 40.0, 15.0)),
            ("apple", (10.0, 40.0, 40.0, 15.0)),
            ("mid", (10.0, 60.0, 40.0, 15.0)),
            ("zone", (10.0, 80.0, 40.0, 15.0)),
            ("MID", (10.0, 100.0, 40.0, 15.0)),
            ("Apple", (10.0, 120.0, 40.0, 15.0)),
        ]);
        let (found, duplicates) = scan_anchor_words(&document, &anchors(&["zone", "mid", "apple"]));
        assert_eq!(duplicates.into_iter().collect::<Vec<_>>(), vec!["apple", "mid", "zone"]);
        assert_eq!(found["zone"][0], Point::new(10.0, 80.0));
    }

    #[test]
    fn test_unique_anchor_words() {
        let document = document_with_words(&[
            ("The", (0.0, 0.0, 10.0, 10.0)),
            ("Election", (0.0, 0.0, 10.0, 10.0)),
            ("the", (0.0, 0.0, 10.0, 10.0)),
            ("Commission", (0.0, 0.0, 10.0, 10.0)),
            ("ELECTION", (0.0, 0.0, 10.0, 10.0)),
            ("Seal", (0.0, 0.0, 10.0, 10.0)),
            ("of", (0.0, 0.0, 10.0, 10.0)),
        ]);
        assert_eq!(
            unique_anchor_words(&document, DEFAULT_MIN_ANCHOR_LENGTH),
            vec!["commission".to_string(), "seal".to_string()]
        );
    }
}
