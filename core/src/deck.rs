//! Pure deck operations. Every function returns a new deck numbered 1..=n.

use std::collections::HashSet;

use tracing::warn;

use slide_protocol::{BatchOp, BatchOpKind, Slide, SlideDraft};

pub fn renumber(slides: &mut [Slide]) {
    for (idx, slide) in slides.iter_mut().enumerate() {
        slide.slide_number = idx as u32 + 1;
    }
}

fn numbered(mut slides: Vec<Slide>) -> Vec<Slide> {
    renumber(&mut slides);
    slides
}

/// Replaces the whole deck.
pub fn create(drafts: &[SlideDraft]) -> Vec<Slide> {
    numbered(drafts.iter().cloned().map(|draft| draft.into_slide(0)).collect())
}

/// Adds `drafts` after the last slide. Incoming numbers are ignored.
pub fn append(deck: &[Slide], drafts: &[SlideDraft]) -> Vec<Slide> {
    let mut slides = deck.to_vec();
    slides.extend(drafts.iter().cloned().map(|draft| draft.into_slide(0)));
    numbered(slides)
}

/// Merges each draft into the slide with the same number.
pub fn update(deck: &[Slide], drafts: &[SlideDraft]) -> Vec<Slide> {
    let mut slides = deck.to_vec();
    for draft in drafts {
        let Some(number) = draft.slide_number else {
            warn!("update without slide number ignored");
            continue;
        };
        match slides.iter_mut().find(|slide| slide.slide_number == number) {
            Some(slide) => slide.merge(draft),
            None => warn!("update for missing slide {number} ignored"),
        }
    }
    numbered(slides)
}

pub fn delete(deck: &[Slide], numbers: &[u32]) -> Vec<Slide> {
    let doomed: HashSet<u32> = numbers.iter().copied().collect();
    numbered(
        deck.iter()
            .filter(|slide| !doomed.contains(&slide.slide_number))
            .cloned()
            .collect(),
    )
}

/// Applies `ops` in order. Numbers in every op refer to the deck before the
/// batch; renumbering happens once at the end.
pub fn batch(deck: &[Slide], ops: &[BatchOp]) -> Vec<Slide> {
    let mut slots: Vec<Option<Slide>> = deck.iter().cloned().map(Some).collect();
    for op in ops {
        let Some(slot) = slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|s| s.slide_number == op.slide_number))
        else {
            warn!("batch {:?} for missing slide {} ignored", op.kind, op.slide_number);
            continue;
        };
        match op.kind {
            BatchOpKind::Update => {
                if let Some(slide) = slot.as_mut() {
                    slide.merge(&op.fields);
                }
            }
            BatchOpKind::Delete => *slot = None,
        }
    }
    numbered(slots.into_iter().flatten().collect())
}

/// Reorders by `order`. Unknown and repeated numbers are skipped; slides the
/// order leaves out keep their relative order after the listed ones.
pub fn sort(deck: &[Slide], order: &[u32]) -> Vec<Slide> {
    let mut placed = HashSet::new();
    let mut slides = Vec::with_capacity(deck.len());
    for number in order {
        if !placed.insert(*number) {
            warn!("sort lists slide {number} twice");
            continue;
        }
        match deck.iter().find(|slide| slide.slide_number == *number) {
            Some(slide) => slides.push(slide.clone()),
            None => warn!("sort lists unknown slide {number}"),
        }
    }

    let missing: Vec<Slide> = deck
        .iter()
        .filter(|slide| !placed.contains(&slide.slide_number))
        .cloned()
        .collect();
    if !missing.is_empty() {
        warn!("sort omitted {} slide(s); keeping them at the end", missing.len());
        slides.extend(missing);
    }
    numbered(slides)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> SlideDraft {
        SlideDraft {
            title: Some(title.to_string()),
            ..SlideDraft::default()
        }
    }

    fn deck(titles: &[&str]) -> Vec<Slide> {
        create(&titles.iter().map(|t| draft(t)).collect::<Vec<_>>())
    }

    fn titles(slides: &[Slide]) -> Vec<&str> {
        slides.iter().map(|s| s.title.as_str()).collect()
    }

    fn numbers(slides: &[Slide]) -> Vec<u32> {
        slides.iter().map(|s| s.slide_number).collect()
    }

    #[test]
    fn append_continues_numbering() {
        let mut incoming = draft("D");
        incoming.slide_number = Some(4);
        let slides = append(&deck(&["A", "B", "C"]), &[incoming]);
        assert_eq!(numbers(&slides), vec![1, 2, 3, 4]);
        assert_eq!(slides[3].title, "D");
    }

    #[test]
    fn update_merges_only_named_fields() {
        let mut change = SlideDraft {
            content: Some("new body".into()),
            ..SlideDraft::default()
        };
        change.slide_number = Some(2);
        let slides = update(&deck(&["A", "B"]), &[change, draft("orphan")]);
        assert_eq!(titles(&slides), vec!["A", "B"]);
        assert_eq!(slides[1].content, "new body");
    }

    #[test]
    fn delete_renumbers() {
        let slides = delete(&deck(&["A", "B", "C", "D"]), &[2, 4]);
        assert_eq!(titles(&slides), vec!["A", "C"]);
        assert_eq!(numbers(&slides), vec![1, 2]);
    }

    #[test]
    fn batch_uses_original_numbers() {
        let ops = vec![
            BatchOp {
                kind: BatchOpKind::Delete,
                slide_number: 1,
                fields: SlideDraft::default(),
            },
            BatchOp {
                kind: BatchOpKind::Update,
                slide_number: 3,
                fields: draft("C2"),
            },
        ];
        let slides = batch(&deck(&["A", "B", "C"]), &ops);
        assert_eq!(titles(&slides), vec!["B", "C2"]);
        assert_eq!(numbers(&slides), vec![1, 2]);
    }

    #[test]
    fn sort_keeps_omitted_slides() {
        let slides = sort(&deck(&["A", "B", "C", "D"]), &[3, 1, 3, 9]);
        assert_eq!(titles(&slides), vec!["C", "A", "B", "D"]);
        assert_eq!(numbers(&slides), vec![1, 2, 3, 4]);
    }
}
