//! Navigation across documents through a headless view.

use gosandbox_history::{EditorView, MemoryView, NavigationHistory};
use gosandbox_types::{EditorOffset, offset_at};

const MAIN: &str = "package main\n\nfunc main() {\n\thelper()\n}\n";
const HELPER: &str = "package main\n\nfunc helper() {}\n";

fn jump(view: &mut MemoryView, history: &mut NavigationHistory, doc: &str, file: &str, row: u32, col: u32) {
    if view.doc() != doc {
        view.set_doc(doc);
    }
    view.set_head(offset_at(row, col, doc).unwrap());
    history.record(Some(&*view), file);
}

#[test]
fn browsing_between_files_swaps_documents_only_when_needed() {
    let mut view = MemoryView::new(MAIN);
    let mut history = NavigationHistory::new();
    history.reset(Some(&view), MAIN, "main.go");

    jump(&mut view, &mut history, MAIN, "main.go", 4, 2);
    view.set_scroll(120);
    jump(&mut view, &mut history, HELPER, "helper.go", 3, 6);
    assert_eq!(history.state().len(), 3);
    let swaps = view.replacements();

    assert!(history.back(Some(&mut view)));
    assert_eq!(view.doc(), MAIN);
    assert_eq!(view.head(), offset_at(4, 2, MAIN).unwrap());
    assert_eq!(view.replacements(), swaps + 1);

    // Same document: cursor moves without a replacement.
    assert!(history.back(Some(&mut view)));
    assert_eq!(view.head(), EditorOffset::new(0));
    assert_eq!(view.replacements(), swaps + 1);
    assert!(!history.back(Some(&mut view)));

    assert!(history.goto(Some(&mut view), 2));
    assert_eq!(view.doc(), HELPER);
    assert_eq!(view.scroll(), 120);
    assert!(!history.forward(Some(&mut view)));
}

#[test]
fn recording_after_going_back_drops_the_forward_branch() {
    let mut view = MemoryView::new(MAIN);
    let mut history = NavigationHistory::new();
    for (row, col) in [(1, 1), (3, 6), (4, 2)] {
        jump(&mut view, &mut history, MAIN, "main.go", row, col);
    }

    assert!(history.back(Some(&mut view)));
    assert!(history.back(Some(&mut view)));
    jump(&mut view, &mut history, HELPER, "helper.go", 3, 6);

    let files: Vec<&str> = history.state().entries().iter().map(|e| e.file_path()).collect();
    assert_eq!(files, vec!["main.go", "helper.go"]);
    assert_eq!(history.state().index(), Some(1));
    assert!(!history.state().can_go_forward());
}

#[test]
fn detached_view_leaves_history_untouched() {
    let mut view = MemoryView::new(MAIN);
    view.set_head(EditorOffset::new(3));
    let mut history = NavigationHistory::new();
    assert!(history.record(Some(&view), "main.go"));

    assert!(!history.record(None::<&MemoryView>, "main.go"));
    assert!(!history.back(None::<&mut MemoryView>));
    assert!(!history.reset(None::<&MemoryView>, HELPER, "helper.go"));
    assert_eq!(history.state().len(), 1);
    assert_eq!(history.state().current().unwrap().doc(), MAIN);
}

#[test]
fn bounded_history_forgets_the_oldest_positions() {
    let mut view = MemoryView::new(MAIN);
    let mut history = NavigationHistory::with_capacity(2);
    for (row, col) in [(1, 1), (3, 6), (4, 2)] {
        jump(&mut view, &mut history, MAIN, "main.go", row, col);
    }

    assert_eq!(history.state().len(), 2);
    assert_eq!(history.state().entries()[0].pos(), offset_at(3, 6, MAIN).unwrap());
    assert_eq!(history.state().index(), Some(1));
}
