//! Pagination properties of the selection keyboard

use std::collections::BTreeSet;

use paperless_bot::bot::actions::Action;
use paperless_bot::bot::ui_builder::{clamp_offset, page_count, selection_keyboard, Keyboard};
use paperless_bot::paperless_models::{Entity, EntityKind, SelectionMode};

fn entities(count: usize) -> Vec<Entity> {
    (1..=count as u32)
        .map(|i| Entity::new(i, format!("entity {i:03}")))
        .collect()
}

fn item_buttons(keyboard: &Keyboard) -> usize {
    keyboard
        .actions()
        .filter(|a| matches!(a, Action::Toggle { .. } | Action::Pick { .. }))
        .count()
}

fn has_prev(keyboard: &Keyboard) -> bool {
    keyboard.rows.iter().flatten().any(|b| {
        matches!(b.action, Action::Page { .. }) && b.label == paperless_bot::localization::t("button-prev")
    })
}

fn has_next(keyboard: &Keyboard) -> bool {
    keyboard.rows.iter().flatten().any(|b| {
        matches!(b.action, Action::Page { .. }) && b.label == paperless_bot::localization::t("button-next")
    })
}

#[test]
fn test_pages_cover_every_item_exactly_once() {
    for n in 0..=20 {
        for p in 1..=5 {
            let items = entities(n);
            let pages = page_count(n, p);
            assert_eq!(pages, n.div_ceil(p), "n={n} p={p}");

            let mut seen = 0;
            for page in 0..pages {
                let keyboard = selection_keyboard(
                    EntityKind::Tag,
                    &items,
                    page * p,
                    p,
                    &BTreeSet::new(),
                    SelectionMode::Multi,
                );
                let shown = item_buttons(&keyboard);
                let expected = if page + 1 == pages && n % p != 0 { n % p } else { p };
                assert_eq!(shown, expected, "n={n} p={p} page={page}");
                assert_eq!(has_prev(&keyboard), page > 0, "n={n} p={p} page={page}");
                assert_eq!(has_next(&keyboard), page + 1 < pages, "n={n} p={p} page={page}");
                seen += shown;
            }
            assert_eq!(seen, n, "n={n} p={p}");
        }
    }
}

#[test]
fn test_empty_list_still_offers_new_and_done() {
    let keyboard = selection_keyboard(
        EntityKind::Tag,
        &[],
        0,
        8,
        &BTreeSet::new(),
        SelectionMode::Multi,
    );
    assert_eq!(item_buttons(&keyboard), 0);
    assert!(keyboard.has_action(Action::New(EntityKind::Tag)));
    assert!(keyboard.has_action(Action::Menu));
    assert!(!has_prev(&keyboard));
    assert!(!has_next(&keyboard));
}

#[test]
fn test_out_of_range_offset_shows_last_page() {
    let items = entities(10);
    assert_eq!(clamp_offset(50, items.len(), 4), 8);

    let keyboard = selection_keyboard(
        EntityKind::DocumentType,
        &items,
        50,
        4,
        &BTreeSet::new(),
        SelectionMode::Single,
    );
    assert_eq!(item_buttons(&keyboard), 2);
    assert!(keyboard.has_action(Action::Pick {
        kind: EntityKind::DocumentType,
        id: 10
    }));
    assert!(keyboard.has_action(Action::Page {
        kind: EntityKind::DocumentType,
        offset: 4
    }));
}

#[test]
fn test_selection_survives_page_changes() {
    let items = entities(12);
    let selected = BTreeSet::from([2, 11]);

    let first = selection_keyboard(EntityKind::Tag, &items, 0, 8, &selected, SelectionMode::Multi);
    let second = selection_keyboard(EntityKind::Tag, &items, 8, 8, &selected, SelectionMode::Multi);

    let checked = |keyboard: &Keyboard| {
        keyboard
            .rows
            .iter()
            .flatten()
            .filter(|b| b.label.starts_with("[x]"))
            .count()
    };
    assert_eq!(checked(&first), 1);
    assert_eq!(checked(&second), 1);
}

#[test]
fn test_markup_carries_encoded_actions() {
    let keyboard = selection_keyboard(
        EntityKind::Correspondent,
        &entities(1),
        0,
        8,
        &BTreeSet::new(),
        SelectionMode::Single,
    );
    let markup = keyboard.to_markup();
    assert_eq!(markup.inline_keyboard.len(), keyboard.rows.len());
    assert_eq!(markup.inline_keyboard[0][0].text, "entity 001");
}
