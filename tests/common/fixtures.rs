#![allow(dead_code)]
use chrono::Utc;
use rmcloud::remote::mock::MockRemoteClient;
use rmcloud::remote::remote_client::{DocumentDetails, FileType, RemoteEntry};
use rmcloud::{ItemKind, ROOT_ID, TRASH_ID};

/// A(parent="") and B(parent="A")
pub fn seed_scenario_a(mock: &MockRemoteClient) {
    mock.add_folder("A", "A", ROOT_ID);
    mock.add_document("B", "B", "A");
}

/// A small library: nested folders, documents with content, a trashed document
pub fn seed_library(mock: &MockRemoteClient) {
    mock.add_folder("books", "Books", ROOT_ID);
    mock.add_folder("fiction", "Fiction", "books");
    mock.add_document("novel", "Novel", "fiction");
    mock.add_document("manual", "Manual", "books");
    mock.add_document("sketch", "Sketch", ROOT_ID);
    mock.put_entry(create_test_entry("old", "Old notes", TRASH_ID, ItemKind::Document));

    mock.set_raw("novel", &[7u8; 2048]);
    mock.set_content("novel", b"%PDF-1.7 novel");
    mock.set_details(
        "novel",
        DocumentDetails {
            file_type: FileType::Pdf,
            size: Some(14),
        },
    );
    mock.set_raw("manual", b"manual package");
}

/// Create a remote entry at version 1
pub fn create_test_entry(id: &str, name: &str, parent: &str, kind: ItemKind) -> RemoteEntry {
    RemoteEntry {
        id: id.to_string(),
        name: name.to_string(),
        parent: parent.to_string(),
        version: 1,
        mtime: Utc::now(),
        kind,
        trashed: false,
    }
}
