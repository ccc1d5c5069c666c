use std::{
    any::type_name_of_val,
    borrow::Cow,
    collections::HashMap,
    convert::Infallible,
    fmt::Debug,
    io::{BufRead, Read},
    sync::Arc,
};

use compact_str::CompactString;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use rand::Rng;
use tracing::instrument;

// the names of unknown tags are only compared, never read back
type TagStringInterner = string_interner::StringInterner<string_interner::backend::BucketBackend>;

// tags relevant for building a revision store, plus their parents
#[derive(PartialEq, Eq)]
enum Tag {
    MediaWiki,         // <mediawiki version="0.11" ...>...</mediawiki> is the root tag
    SiteInfo,          // <siteinfo><dbname>...</dbname><namespaces>...</namespaces></siteinfo>
    DbName,            // <dbname>enwiki</dbname>
    Namespaces,        // <namespaces><namespace key="0" /> ...</namespaces>
    Namespace(String), // <namespace key="2">User</namespace>
    Page,              // <page><title/><ns/><id/><revision/>...</page>
    Title,             // <title>Main Page</title>
    Ns,                // <ns>0</ns>
    Id,                // <id>500</id> (page, revision and contributor ids)
    Revision,          // <revision><id/><parentid/><timestamp/><contributor/><text/></revision>
    ParentId,          // <parentid>499</parentid>
    Timestamp,         // <timestamp>2003-12-05T06:41:50Z</timestamp>
    Contributor,       // <contributor><username>blah</username><id>500</id></contributor>
    Username,          // <username>blah</username>
    Ip,                // <ip>127.0.0.1</ip> for anonymous edits
    Text(bool),        // <text bytes="20">blah</text> or <text bytes="20" deleted="deleted" />
    Unknown(string_interner::DefaultSymbol),
}

impl Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::MediaWiki => write!(f, "<mediawiki>"),
            Tag::SiteInfo => write!(f, "<siteinfo>"),
            Tag::DbName => write!(f, "<dbname>"),
            Tag::Namespaces => write!(f, "<namespaces>"),
            Tag::Namespace(key) => write!(f, "<namespace key={}>", key),
            Tag::Page => write!(f, "<page>"),
            Tag::Title => write!(f, "<title>"),
            Tag::Ns => write!(f, "<ns>"),
            Tag::Id => write!(f, "<id>"),
            Tag::Revision => write!(f, "<revision>"),
            Tag::ParentId => write!(f, "<parentid>"),
            Tag::Timestamp => write!(f, "<timestamp>"),
            Tag::Contributor => write!(f, "<contributor>"),
            Tag::Username => write!(f, "<username>"),
            Tag::Ip => write!(f, "<ip>"),
            Tag::Text(deleted) => {
                if *deleted {
                    write!(f, "<text deleted>")
                } else {
                    write!(f, "<text>")
                }
            }
            Tag::Unknown(tag) => write!(f, "<unknown tag - interned symbol: {:?}>", tag),
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum TagReadingError<T> {
    /// The tag name is not valid UTF-8.
    ///
    /// Parsing may continue, but distinct non-UTF-8 tags become indistinguishable.
    #[error("non-UTF-8 tag detected")]
    NonUtf8Tag(T),
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("missing expected attribute `{0}` for tag `{1}`")]
    MissingAttribute(&'static str, &'static str),
}

#[derive(Debug, thiserror::Error)]
struct NonUtf8Tag<T>(T);

impl Tag {
    fn from_start_bytes(
        e: &BytesStart,
        tag_interner: &mut TagStringInterner,
    ) -> Result<Self, TagReadingError<Tag>> {
        match e.name().as_ref() {
            b"mediawiki" => Ok(Tag::MediaWiki),
            b"siteinfo" => Ok(Tag::SiteInfo),
            b"dbname" => Ok(Tag::DbName),
            b"namespaces" => Ok(Tag::Namespaces),
            b"namespace" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;

                    if attr.key.as_ref() == b"key" {
                        let key = attr.unescape_value()?;
                        return Ok(Tag::Namespace(key.into_owned()));
                    }
                }

                Err(TagReadingError::MissingAttribute("key", "namespace"))
            }
            b"page" => Ok(Tag::Page),
            b"title" => Ok(Tag::Title),
            b"ns" => Ok(Tag::Ns),
            b"id" => Ok(Tag::Id),
            b"revision" => Ok(Tag::Revision),
            b"parentid" => Ok(Tag::ParentId),
            b"timestamp" => Ok(Tag::Timestamp),
            b"contributor" => Ok(Tag::Contributor),
            b"username" => Ok(Tag::Username),
            b"ip" => Ok(Tag::Ip),
            b"text" => {
                let mut deleted = false;
                for attr in e.attributes() {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    if attr.key.as_ref() == b"deleted" {
                        deleted = true;
                    }
                }

                Ok(Tag::Text(deleted))
            }
            _ => {
                let name = e.name().into_inner();

                if let Ok(name) = std::str::from_utf8(name) {
                    Ok(Tag::Unknown(tag_interner.get_or_intern(name)))
                } else {
                    Err(TagReadingError::NonUtf8Tag(Tag::Unknown(
                        tag_interner.get_or_intern("non-utf8 tag"),
                    )))
                }
            }
        }
    }

    fn matches_end_bytes(
        &self,
        e: &BytesEnd,
        tag_interner: &mut TagStringInterner,
    ) -> Result<bool, NonUtf8Tag<bool>> {
        match (self, e.name().as_ref()) {
            (Tag::MediaWiki, b"mediawiki") => Ok(true),
            (Tag::SiteInfo, b"siteinfo") => Ok(true),
            (Tag::DbName, b"dbname") => Ok(true),
            (Tag::Namespaces, b"namespaces") => Ok(true),
            (Tag::Namespace(_), b"namespace") => Ok(true),
            (Tag::Page, b"page") => Ok(true),
            (Tag::Title, b"title") => Ok(true),
            (Tag::Ns, b"ns") => Ok(true),
            (Tag::Id, b"id") => Ok(true),
            (Tag::Revision, b"revision") => Ok(true),
            (Tag::ParentId, b"parentid") => Ok(true),
            (Tag::Timestamp, b"timestamp") => Ok(true),
            (Tag::Contributor, b"contributor") => Ok(true),
            (Tag::Username, b"username") => Ok(true),
            (Tag::Ip, b"ip") => Ok(true),
            (Tag::Text(_), b"text") => Ok(true),
            (Tag::Unknown(expected_tag), tag_name) => {
                if let Ok(tag) = std::str::from_utf8(tag_name) {
                    let tag = tag_interner.get_or_intern(tag);
                    Ok(tag == *expected_tag)
                } else {
                    let tag = tag_interner.get_or_intern("non-utf8 tag");
                    Err(NonUtf8Tag(tag == *expected_tag))
                }
            }
            _ => Ok(false),
        }
    }
}

/// Author of a revision. Anonymous editors carry their IP address as `username` and no id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Contributor {
    pub username: CompactString,
    pub id: Option<i32>,
}

impl Contributor {
    pub fn is_registered(&self) -> bool {
        matches!(self.id, Some(id) if id > 0)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Text {
    Normal(String),
    Deleted,
}

impl Text {
    /// Content as a string slice; suppressed content reads as empty.
    pub fn as_str(&self) -> &str {
        match self {
            Text::Normal(text) => text,
            Text::Deleted => "",
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Text::Normal(text) => write!(f, "{:?}", text),
            Text::Deleted => write!(f, "Deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    pub id: i32,
    /// `None` when the dump does not say; `Some(0)` marks an explicit page creation.
    pub parent_id: Option<i32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub contributor: Contributor,
    pub text: Text,
}

#[derive(Debug)]
struct RevisionBuilder {
    id: Option<i32>,
    parent_id: Option<i32>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    contributor_name: Option<CompactString>,
    contributor_id: Option<i32>,
    text: Option<Text>,
}

#[derive(Debug, thiserror::Error)]
#[error("missing mandatory field: {0}")]
struct BuildRevisionError(&'static str, Box<RevisionBuilder>);

impl RevisionBuilder {
    fn new() -> Self {
        Self {
            id: None,
            parent_id: None,
            timestamp: None,
            contributor_name: None,
            contributor_id: None,
            text: None,
        }
    }

    fn try_build(self) -> Result<Revision, BuildRevisionError> {
        let (Some(id), Some(timestamp), Some(username), Some(text)) = (
            self.id,
            self.timestamp,
            self.contributor_name.clone(),
            self.text.clone(),
        ) else {
            let field = if self.id.is_none() {
                "id"
            } else if self.timestamp.is_none() {
                "timestamp"
            } else if self.contributor_name.is_none() {
                "contributor_name"
            } else {
                "text"
            };
            return Err(BuildRevisionError(field, self.into()));
        };

        Ok(Revision {
            id,
            parent_id: self.parent_id,
            timestamp,
            contributor: Contributor {
                username,
                id: self.contributor_id,
            },
            text,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Page {
    pub id: i32,
    pub title: CompactString,
    pub namespace: i32,
    /// In dump order, oldest first.
    pub revisions: Vec<Revision>,
}

#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Default,
    Named(CompactString),
}

impl Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Namespace::Default => write!(f, "Default"),
            Namespace::Named(name) => write!(f, "{:?}", name),
        }
    }
}

/// MediaWiki's canonical id of the user namespace.
pub const USER_NAMESPACE: i32 = 2;
pub const USER_TALK_NAMESPACE: i32 = 3;

#[derive(Debug, Default)]
pub struct SiteInfo {
    pub dbname: CompactString,
    pub namespaces: HashMap<i32, Namespace>,
}

impl SiteInfo {
    /// Localized name of the user namespace, falling back to `User`.
    pub fn user_namespace(&self) -> &str {
        match self.namespaces.get(&USER_NAMESPACE) {
            Some(Namespace::Named(name)) => name.as_str(),
            _ => "User",
        }
    }

    pub fn user_talk_namespace(&self) -> &str {
        match self.namespaces.get(&USER_TALK_NAMESPACE) {
            Some(Namespace::Named(name)) => name.as_str(),
            _ => "User talk",
        }
    }
}

pub struct DumpParser<R: BufRead> {
    tag_interner: TagStringInterner,
    xml_parser: quick_xml::Reader<R>,
    buf: Vec<u8>,
    current_path: Vec<Tag>,
    site_info: SiteInfo,
    non_utf8_reporter: NonUtf8Reporter,
}

impl<R: BufRead> Debug for DumpParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpParser")
            .field("tag_interner", &type_name_of_val(&self.tag_interner))
            .field("xml_parser", &type_name_of_val(&self.xml_parser))
            .field("buf.len", &self.buf.len())
            .field("buf.capacity", &self.buf.capacity())
            .field("current_path", &self.current_path)
            .field("site_info", &self.site_info)
            .finish()
    }
}

#[derive(Debug)]
struct NonUtf8Reporter {
    num_tags: usize,
}

impl NonUtf8Reporter {
    fn new() -> Self {
        Self { num_tags: 0 }
    }

    fn register(&mut self, name: &[u8]) {
        self.num_tags += 1;

        if self.num_tags == 1 {
            tracing::warn!(message = "Non-UTF-8 tag in XML detected. Parsing will continue, but the results may be incorrect. Further non-UTF-8 tags will not be reported.", name = String::from_utf8_lossy(name).as_ref());
        }
    }

    fn tag_from_start_bytes(
        &mut self,
        e: &BytesStart,
        tag_interner: &mut TagStringInterner,
    ) -> Result<Tag, TagReadingError<Infallible>> {
        match Tag::from_start_bytes(e, tag_interner) {
            Ok(tag) => Ok(tag),
            Err(TagReadingError::NonUtf8Tag(tag)) => {
                self.register(e.name().as_ref());
                Ok(tag)
            }
            Err(TagReadingError::XmlError(e)) => Err(TagReadingError::XmlError(e)),
            Err(TagReadingError::MissingAttribute(att, tag)) => {
                Err(TagReadingError::MissingAttribute(att, tag))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("XML error")]
    XmlError(#[from] quick_xml::Error),
    #[error("unexpected end of file")]
    Eof,
}

impl<R: BufRead> DumpParser<R> {
    pub fn new(reader: R) -> Result<Self, ParsingError> {
        // expand_empty_elements stays off, empty elements arrive as `Event::Empty`
        let xml_parser = quick_xml::Reader::from_reader(reader);

        let mut new = Self {
            tag_interner: TagStringInterner::new(),
            xml_parser,
            buf: Vec::with_capacity(1024 * 1024),
            current_path: Vec::new(),
            site_info: SiteInfo::default(),
            non_utf8_reporter: NonUtf8Reporter::new(),
        };

        new.parse_site_info()?;

        Ok(new)
    }

    pub fn site_info(&self) -> &SiteInfo {
        &self.site_info
    }

    /// Parse every remaining page of the dump.
    pub fn parse_all(&mut self) -> Result<Vec<Page>, ParsingError> {
        let mut pages = Vec::new();
        while let Some(page) = self.parse_page()? {
            pages.push(page);
        }
        Ok(pages)
    }

    fn parse_start_bytes(
        e: &BytesStart,
        non_utf8_reporter: &mut NonUtf8Reporter,
        tag_interner: &mut TagStringInterner,
        current_path: &[Tag],
    ) -> Result<Tag, quick_xml::Error> {
        match non_utf8_reporter.tag_from_start_bytes(e, tag_interner) {
            Ok(tag) => Ok(tag),
            Err(TagReadingError::MissingAttribute(attribute, tag)) => {
                // only <namespace> has a mandatory attribute
                tracing::warn!(
                    message = "missing expected attribute, ignoring the tag",
                    attribute,
                    tag,
                    path = ?current_path
                );
                Ok(Tag::Namespace("ignored".to_string()))
            }
            Err(TagReadingError::XmlError(e)) => Err(e),
            Err(TagReadingError::NonUtf8Tag(never)) => match never {},
        }
    }

    // debugging aid for format changes
    fn check_known_tags_in_unexpected_location(&self, is_empty: bool) {
        let Some(tag) = self.current_path.last() else {
            return;
        };

        if !matches!(tag, Tag::Unknown(_)) {
            tracing::debug!(
                message = "found known tag in unexpected location",
                tag = ?tag,
                path = ?self.current_path,
                is_empty
            );
        }
    }

    fn abort_parsing<T>(xml_parser: &mut quick_xml::Reader<R>) -> Result<T, ParsingError> {
        tracing::error!("Aborting parsing due to error");
        let mut useless_buf = [0];
        xml_parser
            .stream()
            .take(u64::MAX)
            .read(&mut useless_buf)
            .map_err(|e| quick_xml::Error::Io(Arc::new(e)))?;
        Err(ParsingError::Eof)
    }

    fn check_end_tag(
        e: &BytesEnd,
        current_path: &mut Vec<Tag>,
        tag_interner: &mut TagStringInterner,
        xml_parser: &mut quick_xml::Reader<R>,
    ) -> Result<Option<Tag>, ParsingError> {
        let Some(tag) = current_path.pop() else {
            let tag = String::from_utf8_lossy(e.name().into_inner());
            tracing::error!(message = "Unexpected end tag", tag = tag.as_ref(), position = xml_parser.buffer_position());

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            }
            tracing::warn!("Ignoring unexpected end tag. This may lead to incorrect results.");
            return Ok(None);
        };

        // a non-UTF-8 name was already reported when the start tag was read
        let matches = tag
            .matches_end_bytes(e, tag_interner)
            .unwrap_or_else(|e| e.0);
        if !matches {
            tracing::error!(
                message = "Mismatched tags",
                expected = ?tag,
                actual = String::from_utf8_lossy(e.name().as_ref()).as_ref(),
                current_path = ?current_path,
                position = xml_parser.buffer_position()
            );

            if cfg!(feature = "strict") {
                return Self::abort_parsing(xml_parser);
            }
            // an unmatched closing tag, a typo and an unclosed opening tag look the same
            // from here, so just carry on with the popped tag
            tracing::warn!("Ignoring mismatched tag. This may lead to incorrect results.");
        }

        Ok(Some(tag))
    }

    #[instrument(skip(self))]
    fn parse_site_info(&mut self) -> Result<(), ParsingError> {
        let mut site_info = SiteInfo::default();

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;
                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    use Tag::*;

                    self.current_path.push(tag);
                    if let [MediaWiki, SiteInfo, Namespaces, Namespace(id)] =
                        self.current_path.as_slice()
                    {
                        if let Ok(key) = id.parse() {
                            site_info.namespaces.insert(key, self::Namespace::Default);
                        } else if id != "ignored" {
                            tracing::warn!(message = "Ignoring namespace with invalid id", id);
                        }
                    } else {
                        self.check_known_tags_in_unexpected_location(true);
                    }
                    self.current_path.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match self.current_path.as_slice() {
                        [MediaWiki, SiteInfo, DbName] => {
                            site_info.dbname = CompactString::from(text.as_ref());
                        }
                        [MediaWiki, SiteInfo, Namespaces, Namespace(id)] => {
                            if let Ok(key) = id.parse() {
                                site_info.namespaces.insert(
                                    key,
                                    self::Namespace::Named(CompactString::from(text.as_ref())),
                                );
                            } else if id != "ignored" {
                                tracing::warn!(
                                    message = "Ignoring namespace with invalid id",
                                    id,
                                    name = text.as_ref()
                                );
                            }
                        }
                        _ => self.check_known_tags_in_unexpected_location(false),
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::SiteInfo) {
                        break;
                    }
                }
                Event::Eof => {
                    tracing::error!(partial_site_info = ?site_info, current_path = ?self.current_path);
                    return Err(ParsingError::Eof);
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        self.site_info = site_info;
        Ok(())
    }

    pub fn parse_page(&mut self) -> Result<Option<Page>, ParsingError> {
        let span = tracing::span!(tracing::Level::DEBUG, "parse_page", title = tracing::field::Empty);
        let _guard = span.enter();

        let mut page = Page {
            id: 0,
            title: CompactString::default(),
            namespace: 0,
            revisions: Vec::new(),
        };
        let mut started_page = false;
        let mut revision_builder: Option<RevisionBuilder> = None;

        loop {
            match self.xml_parser.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    match tag {
                        Tag::Page => started_page = true,
                        Tag::Revision => revision_builder = Some(RevisionBuilder::new()),
                        _ => {}
                    }

                    self.current_path.push(tag);
                }
                Event::Empty(ref e) => {
                    let tag = Self::parse_start_bytes(
                        e,
                        &mut self.non_utf8_reporter,
                        &mut self.tag_interner,
                        &self.current_path,
                    )?;

                    self.current_path.push(tag);

                    use Tag::*;

                    match (self.current_path.as_slice(), revision_builder.as_mut()) {
                        ([MediaWiki, Page, Revision, Text(deleted)], Some(builder)) => {
                            builder.text = Some(if *deleted {
                                self::Text::Deleted
                            } else {
                                self::Text::Normal(String::new())
                            });
                        }
                        // <contributor deleted="deleted" />, attributed to nobody
                        ([MediaWiki, Page, Revision, Contributor], Some(builder)) => {
                            builder.contributor_name = Some(CompactString::default());
                            builder.contributor_id = None;
                        }
                        _ => self.check_known_tags_in_unexpected_location(true),
                    }
                    self.current_path.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape()?;

                    use Tag::*;

                    match (self.current_path.as_slice(), revision_builder.as_mut()) {
                        ([MediaWiki, Page, Title], _) => {
                            page.title = CompactString::from(normalize_title(&text));
                            span.record("title", page.title.as_str());
                        }
                        ([MediaWiki, Page, Ns], _) => {
                            page.namespace = text.parse().unwrap_or_else(|_| {
                                tracing::warn!(
                                    message = "Found invalid namespace id, defaulting to 0",
                                    ns = text.as_ref()
                                );
                                0
                            });
                        }
                        ([MediaWiki, Page, Id], _) => {
                            page.id = text.parse().unwrap_or_else(|_| {
                                tracing::warn!(
                                    message = "Found invalid page id, generating a random id",
                                    id = text.as_ref()
                                );
                                // negative ids never collide with real ones
                                rand::thread_rng().gen_range(i32::MIN..-100)
                            });
                        }
                        ([MediaWiki, Page, Revision, Id], Some(builder)) => {
                            builder.id = Some(text.parse().unwrap_or_else(|_| {
                                tracing::info!(
                                    message = "Found invalid revision id, generating a random id",
                                    id = text.as_ref()
                                );
                                rand::thread_rng().gen_range(i32::MIN..-100)
                            }));
                        }
                        ([MediaWiki, Page, Revision, ParentId], Some(builder)) => {
                            builder.parent_id = text.parse().ok();
                            if builder.parent_id.is_none() {
                                tracing::warn!(
                                    message = "Found invalid parent revision id",
                                    id = text.as_ref()
                                );
                            }
                        }
                        ([MediaWiki, Page, Revision, Timestamp], Some(builder)) => {
                            builder.timestamp = parse_timestamp(&text);
                            if builder.timestamp.is_none() {
                                tracing::warn!(
                                    message = "Found invalid revision timestamp",
                                    timestamp = text.as_ref()
                                );
                            }
                        }
                        ([MediaWiki, Page, Revision, Contributor, Username | Ip], Some(builder)) => {
                            builder.contributor_name = Some(CompactString::from(text.as_ref()));
                        }
                        ([MediaWiki, Page, Revision, Contributor, Id], Some(builder)) => {
                            builder.contributor_id = text.parse().ok();
                            if builder.contributor_id.is_none() {
                                tracing::warn!(
                                    message = "Found invalid contributor id",
                                    id = text.as_ref()
                                );
                            }
                        }
                        ([MediaWiki, Page, Revision, Text(deleted)], Some(builder)) => {
                            builder.text = Some(if *deleted {
                                self::Text::Deleted
                            } else {
                                self::Text::Normal(text.into_owned())
                            });
                        }
                        _ => self.check_known_tags_in_unexpected_location(false),
                    }
                }
                Event::End(ref e) => {
                    let tag = Self::check_end_tag(
                        e,
                        &mut self.current_path,
                        &mut self.tag_interner,
                        &mut self.xml_parser,
                    )?;

                    if tag == Some(Tag::Revision) {
                        if let Some(builder) = revision_builder.take() {
                            match builder.try_build() {
                                Ok(revision) => page.revisions.push(revision),
                                Err(BuildRevisionError(field, partial)) => {
                                    tracing::error!(
                                        message = "Missing mandatory field in revision",
                                        field,
                                        partial_revision = ?partial,
                                        position = self.xml_parser.buffer_position()
                                    );
                                    if cfg!(feature = "strict") {
                                        return Self::abort_parsing(&mut self.xml_parser);
                                    }
                                    tracing::warn!("Ignoring revision with missing mandatory field");
                                }
                            }
                        }
                    }

                    if tag == Some(Tag::Page) {
                        break;
                    }
                }
                Event::Eof => {
                    if started_page {
                        tracing::error!(partial_page = ?page, current_path = ?self.current_path);
                        return Err(ParsingError::Eof);
                    }
                    return Ok(None);
                }
                _ => {}
            }
            self.buf.clear();
        }
        self.buf.clear();

        Ok(Some(page))
    }
}

/// Strip the namespace prefix and turn underscores into spaces.
fn normalize_title(title: &str) -> Cow<'_, str> {
    let title = title.split_once(':').map_or(title, |(_, rest)| rest);
    if title.contains('_') {
        title.replace('_', " ").into()
    } else {
        title.into()
    }
}

fn parse_timestamp(text: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";
    const TIMESTAMP_FORMAT_SHORT: &str = "%Y%m%d%H%M%S";

    chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_SHORT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_LONG))
        .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prelude::*;

    fn parse(xml: &str) -> (SiteInfo, Vec<Page>) {
        let mut parser = DumpParser::new(xml.as_bytes()).unwrap();
        let pages = parser.parse_all().unwrap();
        (std::mem::take(&mut parser.site_info), pages)
    }

    #[test]
    fn reads_site_info_namespaces() {
        let (site_info, pages) = parse(&dump_to_xml(&[]));

        assert_eq!(site_info.dbname, "testwiki");
        assert_eq!(site_info.user_namespace(), "User");
        assert_eq!(site_info.namespaces.get(&0), Some(&Namespace::Default));
        assert!(pages.is_empty());
    }

    #[test]
    fn reads_page_and_revision_fields() {
        let page = Page {
            id: 7,
            title: "Sandbox".into(),
            namespace: 0,
            revisions: vec![
                Revision {
                    id: 10,
                    parent_id: Some(0),
                    text: Text::Normal("first".into()),
                    contributor: Contributor {
                        username: "Alice".into(),
                        id: Some(1),
                    },
                    ..dummy_revision()
                },
                Revision {
                    id: 11,
                    parent_id: Some(10),
                    text: Text::Deleted,
                    contributor: Contributor {
                        username: "10.0.0.1".into(),
                        id: None,
                    },
                    ..dummy_revision()
                },
            ],
        };

        let (_, pages) = parse(&dump_to_xml(&[page.clone()]));

        assert_eq!(pages, vec![page]);
    }

    #[test]
    fn unused_revision_fields_are_skipped() {
        let page = Page {
            id: 1,
            title: "Page".into(),
            namespace: 0,
            revisions: vec![Revision {
                id: 3,
                ..dummy_revision()
            }],
        };
        let xml = dump_to_xml(&[page.clone()])
            .replace("<revision>", "<revision><minor /><comment>typo</comment>");

        let (_, pages) = parse(&xml);

        assert_eq!(pages, vec![page]);
    }

    #[test]
    fn missing_parent_id_is_left_open() {
        let page = Page {
            id: 1,
            title: "Page".into(),
            namespace: 0,
            revisions: vec![Revision {
                id: 3,
                parent_id: None,
                ..dummy_revision()
            }],
        };

        let (_, pages) = parse(&dump_to_xml(&[page]));

        assert_eq!(pages[0].revisions[0].parent_id, None);
    }

    #[test]
    fn namespace_prefix_is_stripped_from_titles() {
        assert_eq!(normalize_title("User:Some_Body"), "Some Body");
        assert_eq!(normalize_title("Plain"), "Plain");
    }

    #[test]
    fn both_timestamp_formats_parse() {
        let long = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
        let short = parse_timestamp("20240102030405").unwrap();
        assert_eq!(long, short);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
