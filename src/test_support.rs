use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use rustc_hash::FxHashMap;
use std::io::Cursor;

use crate::dump_parser::{Contributor, Page, Revision, Text};
use crate::store::{PageId, RevisionEdit, RevisionId, User, UserId, WikiStore};

pub mod prelude {
    pub(crate) use super::{dummy_revision, dump_to_xml, TestWiki};
    pub(crate) use proptest::prelude::*;
}

pub fn dummy_revision() -> Revision {
    Revision {
        id: 0,
        parent_id: None,
        text: Text::Normal(String::new()),
        timestamp: DateTime::from_timestamp_nanos(0),
        contributor: Contributor {
            id: Some(1),
            username: "Dummy".into(),
        },
    }
}

/// Builds a [`WikiStore`] revision by revision, chaining each edit of a page to the previous one.
pub struct TestWiki {
    store: WikiStore,
    next_revision: RevisionId,
    latest_by_page: FxHashMap<PageId, RevisionId>,
}

impl TestWiki {
    pub fn new() -> Self {
        Self {
            store: WikiStore::new(),
            next_revision: 1,
            latest_by_page: FxHashMap::default(),
        }
    }

    pub fn user(&mut self, id: UserId, name: &str) -> &mut Self {
        self.store.insert_user(User::registered(id, name));
        self
    }

    pub fn store_mut(&mut self) -> &mut WikiStore {
        &mut self.store
    }

    /// Record an edit and return its revision id.
    pub fn edit(&mut self, user: UserId, page: PageId, at: DateTime<Utc>, text: &str) -> RevisionId {
        let id = self.next_revision;
        self.next_revision += 1;
        let parent_id = self.latest_by_page.insert(page, id);

        self.store.insert_edit(RevisionEdit {
            id,
            page_id: page,
            parent_id,
            user_id: user,
            timestamp: at,
            text: Text::Normal(text.to_string()),
        });
        id
    }

    pub fn into_store(self) -> WikiStore {
        self.store
    }
}

/// Serialize pages as a complete MediaWiki export document.
pub fn dump_to_xml(pages: &[Page]) -> String {
    const HEADER: &str = r#"<mediawiki xmlns="http://www.mediawiki.org/xml/export-0.11/" version="0.11" xml:lang="en"><siteinfo><sitename>Test Wiki</sitename><dbname>testwiki</dbname><namespaces><namespace key="-1" case="first-letter">Special</namespace><namespace key="0" case="first-letter" /><namespace key="2" case="first-letter">User</namespace><namespace key="3" case="first-letter">User talk</namespace></namespaces></siteinfo>"#;
    const FOOTER: &str = "</mediawiki>";
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";

    let mut xml = Vec::new();
    let mut writer = quick_xml::Writer::new(Cursor::new(&mut xml));

    fn element<W: std::io::Write>(writer: &mut quick_xml::Writer<W>, name: &str, value: &str) {
        writer.write_event(Event::Start(BytesStart::new(name))).unwrap();
        writer.write_event(Event::Text(BytesText::new(value))).unwrap();
        writer.write_event(Event::End(BytesEnd::new(name))).unwrap();
    }

    for page in pages {
        writer
            .write_event(Event::Start(BytesStart::new("page")))
            .unwrap();
        element(&mut writer, "title", &page.title);
        element(&mut writer, "ns", &page.namespace.to_string());
        element(&mut writer, "id", &page.id.to_string());

        for revision in &page.revisions {
            writer
                .write_event(Event::Start(BytesStart::new("revision")))
                .unwrap();
            element(&mut writer, "id", &revision.id.to_string());
            if let Some(parent_id) = revision.parent_id {
                element(&mut writer, "parentid", &parent_id.to_string());
            }
            element(
                &mut writer,
                "timestamp",
                &revision.timestamp.format(TIMESTAMP_FORMAT_LONG).to_string(),
            );

            writer
                .write_event(Event::Start(BytesStart::new("contributor")))
                .unwrap();
            match revision.contributor.id {
                Some(id) => {
                    element(&mut writer, "username", &revision.contributor.username);
                    element(&mut writer, "id", &id.to_string());
                }
                None => element(&mut writer, "ip", &revision.contributor.username),
            }
            writer
                .write_event(Event::End(BytesEnd::new("contributor")))
                .unwrap();

            let bytes = revision.text.len().to_string();
            let mut text_tag = BytesStart::new("text");
            text_tag.push_attribute(("bytes", bytes.as_str()));
            match &revision.text {
                Text::Normal(text) if !text.is_empty() => {
                    writer.write_event(Event::Start(text_tag)).unwrap();
                    writer
                        .write_event(Event::Text(BytesText::new(text)))
                        .unwrap();
                    writer.write_event(Event::End(BytesEnd::new("text"))).unwrap();
                }
                Text::Normal(_) => {
                    writer.write_event(Event::Empty(text_tag)).unwrap();
                }
                Text::Deleted => {
                    text_tag.push_attribute(("deleted", "deleted"));
                    writer.write_event(Event::Empty(text_tag)).unwrap();
                }
            }

            writer
                .write_event(Event::End(BytesEnd::new("revision")))
                .unwrap();
        }

        writer
            .write_event(Event::End(BytesEnd::new("page")))
            .unwrap();
    }

    let body = String::from_utf8(xml).unwrap();
    format!("{HEADER}{body}{FOOTER}")
}
