use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use super::charset::{CharsetDecoder, CharsetError, DefaultCharsets};

const RSS2_MARKER: &[u8] = b"<rss";
const RSS1_MARKER: &[u8] = b"xmlns=\"http://purl.org/rss/1.0/\"";

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`, after
/// the `Mon, ` prefix has been stripped.
const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

/// Day names accepted in the `pubDate` prefix. The name is not checked
/// against the date it precedes.
const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// SEC-003: Maximum element nesting depth in a feed document.
/// Deeper documents are rejected before decoding work grows with depth.
const MAX_FEED_DEPTH: usize = 64;

/// Syndication formats recognized by [`detect_format`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss2,
    /// Recognized but not implemented.
    Rss1,
    /// Anything else, Atom included.
    Unknown,
}

impl std::fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedFormat::Rss2 => write!(f, "RSS 2.0"),
            FeedFormat::Rss1 => write!(f, "RSS 1.0 (not implemented)"),
            FeedFormat::Unknown => write!(f, "unknown format"),
        }
    }
}

/// Errors that can occur while decoding a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not RSS 2.0.
    #[error("unsupported feed format: {0}")]
    UnsupportedFormat(FeedFormat),

    /// XML was malformed or ended early.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The root element was not `<rss>`.
    #[error("expected <rss> root element, found <{0}>")]
    UnexpectedRoot(String),

    /// `<rss>` had no `<channel>` child.
    #[error("no channel element found")]
    MissingChannel,

    /// SEC-003: Element nesting exceeds the safety limit.
    #[error("feed nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// The declared encoding is outside the allow-list.
    #[error(transparent)]
    Charset(#[from] CharsetError),
}

/// A decoded RSS 2.0 channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub link: String,
    /// Entries in document order.
    pub entries: Vec<Entry>,
}

/// A single `<item>` as it appears in the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub title: String,
    pub description: String,
    pub link: String,
    /// Raw `<pubDate>` text; see [`parse_date`].
    pub pub_date: String,
}

/// Picks a decoder by looking for format markers in the raw bytes.
pub fn detect_format(data: &[u8]) -> FeedFormat {
    if contains(data, RSS2_MARKER) {
        FeedFormat::Rss2
    } else if contains(data, RSS1_MARKER) {
        FeedFormat::Rss1
    } else {
        FeedFormat::Unknown
    }
}

/// Decodes a feed using the built-in charset allow-list.
pub fn parse_feed(data: &[u8]) -> Result<Feed, ParseError> {
    parse_feed_with(data, &DefaultCharsets)
}

/// Decodes a feed, routing any declared encoding through `charsets`.
///
/// # Errors
///
/// - [`ParseError::UnsupportedFormat`] for RSS 1.0 and unrecognized documents
/// - [`ParseError::Charset`] if the hook rejects the declared encoding
/// - [`ParseError::Xml`], [`ParseError::UnexpectedRoot`] or
///   [`ParseError::MissingChannel`] for structural problems
pub fn parse_feed_with(data: &[u8], charsets: &dyn CharsetDecoder) -> Result<Feed, ParseError> {
    match detect_format(data) {
        FeedFormat::Rss2 => {
            let declared = declared_encoding(data)?;
            let utf8 = charsets.decode(declared.as_deref().unwrap_or(""), data)?;
            parse_rss2(&utf8)
        }
        format => Err(ParseError::UnsupportedFormat(format)),
    }
}

/// Parses a `<pubDate>` value, normalized to UTC.
///
/// The leading day name must be one of [`WEEKDAYS`] but may disagree with the
/// date, which is common in real feeds. Values that don't match fall back to
/// the current time instead of failing the feed.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use feedpool::feed::parse_date;
///
/// // 2023-01-01 was a Sunday
/// let date = parse_date("Mon, 01 Jan 2023 00:01:00 +0000");
/// assert_eq!(date, Utc.with_ymd_and_hms(2023, 1, 1, 0, 1, 0).unwrap());
/// ```
pub fn parse_date(raw: &str) -> DateTime<Utc> {
    match parse_rfc1123z(raw.trim()) {
        Some(date) => date,
        None => {
            tracing::trace!(raw = raw, "Unparsable pubDate, using current time");
            Utc::now()
        }
    }
}

fn parse_rfc1123z(raw: &str) -> Option<DateTime<Utc>> {
    let (day, rest) = raw.split_once(", ")?;
    if !WEEKDAYS.iter().any(|d| d.eq_ignore_ascii_case(day)) {
        return None;
    }
    DateTime::parse_from_str(rest, PUB_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reads the `encoding` pseudo-attribute of the XML declaration, if any.
///
/// Only the prolog is inspected, so non-UTF-8 bytes later in the document
/// are never touched here.
fn declared_encoding(data: &[u8]) -> Result<Option<String>, ParseError> {
    let mut reader = Reader::from_reader(data);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Decl(decl)) => {
                return match decl.encoding() {
                    Some(Ok(enc)) => Ok(Some(String::from_utf8_lossy(&enc).into_owned())),
                    Some(Err(e)) => Err(ParseError::Xml(e.to_string())),
                    None => Ok(None),
                };
            }
            Ok(Event::Start(_)) | Ok(Event::Empty(_)) | Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(ParseError::Xml(e.to_string())),
        }
        buf.clear();
    }
}

/// Decodes UTF-8 RSS 2.0 bytes into a [`Feed`].
///
/// Elements are matched by their qualified name, so `atom:link` inside a
/// channel is not mistaken for `link`.
fn parse_rss2(data: &[u8]) -> Result<Feed, ParseError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; only the
    // five XML builtins are resolved by `unescape()`.
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<Node> = Vec::new();
    let mut state = DecodeState::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                // SEC-003: Reject excessively nested documents
                if path.len() >= MAX_FEED_DEPTH {
                    return Err(ParseError::MaxDepthExceeded(MAX_FEED_DEPTH));
                }
                let node = state.open(&path, e.name().as_ref())?;
                path.push(node);
            }
            Ok(Event::Empty(e)) => {
                let node = state.open(&path, e.name().as_ref())?;
                state.close(&path, node);
            }
            Ok(Event::End(_)) => {
                if let Some(node) = path.pop() {
                    state.close(&path, node);
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                state.text(&path, &text);
            }
            Ok(Event::CData(c)) => {
                let text = std::str::from_utf8(&c).map_err(|e| ParseError::Xml(e.to_string()))?;
                state.text(&path, text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ParseError::Xml(e.to_string())),
        }
        buf.clear();
    }

    if !path.is_empty() {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }

    state.channel.ok_or(ParseError::MissingChannel)
}

/// An open element, reduced to the names the decoder cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Rss,
    Channel,
    Item,
    Title,
    Link,
    Description,
    PubDate,
    Other,
}

impl Node {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"rss" => Node::Rss,
            b"channel" => Node::Channel,
            b"item" => Node::Item,
            b"title" => Node::Title,
            b"link" => Node::Link,
            b"description" => Node::Description,
            b"pubDate" => Node::PubDate,
            _ => Node::Other,
        }
    }
}

#[derive(Default)]
struct DecodeState {
    channel: Option<Feed>,
    entry: Option<Entry>,
}

impl DecodeState {
    fn open(&mut self, parent: &[Node], name: &[u8]) -> Result<Node, ParseError> {
        let node = Node::from_name(name);
        match (parent, node) {
            ([], Node::Rss) => {}
            ([], _) => {
                return Err(ParseError::UnexpectedRoot(
                    String::from_utf8_lossy(name).into_owned(),
                ))
            }
            ([Node::Rss], Node::Channel) => {
                self.channel.get_or_insert_with(Feed::default);
            }
            ([Node::Rss, Node::Channel], Node::Item) => {
                self.entry = Some(Entry::default());
            }
            _ => {}
        }
        Ok(node)
    }

    fn close(&mut self, parent: &[Node], node: Node) {
        if let ([Node::Rss, Node::Channel], Node::Item) = (parent, node) {
            if let (Some(entry), Some(channel)) = (self.entry.take(), self.channel.as_mut()) {
                channel.entries.push(entry);
            }
        }
    }

    fn text(&mut self, path: &[Node], text: &str) {
        let target = match path {
            [Node::Rss, Node::Channel, Node::Title] => {
                self.channel.as_mut().map(|c| &mut c.title)
            }
            [Node::Rss, Node::Channel, Node::Link] => self.channel.as_mut().map(|c| &mut c.link),
            [Node::Rss, Node::Channel, Node::Item, field] => {
                self.entry.as_mut().and_then(|e| match field {
                    Node::Title => Some(&mut e.title),
                    Node::Description => Some(&mut e.description),
                    Node::Link => Some(&mut e.link),
                    Node::PubDate => Some(&mut e.pub_date),
                    _ => None,
                })
            }
            _ => None,
        };

        if let Some(target) = target {
            target.push_str(text);
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
