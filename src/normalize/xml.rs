//! Tag-markup handler

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Value};
use tokio::io::{AsyncWriteExt, BufReader};

use super::artifact_key;
use super::error::{NormalizeError, NormalizeResult};
use super::handler::StreamHandler;
use super::writer::JsonArrayWriter;
use crate::storage::{ArtifactReader, ArtifactWriter, StorageBackend};

/// Buffers raw markup to a scratch file and streams it into records on finalize
pub struct XmlHandler {
    storage: Arc<dyn StorageBackend>,
    raw_path: Option<String>,
    raw: Option<ArtifactWriter>,
    output_path: Option<String>,
}

impl XmlHandler {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            storage,
            raw_path: None,
            raw: None,
            output_path: None,
        }
    }
}

#[async_trait]
impl StreamHandler for XmlHandler {
    async fn create(&mut self) -> NormalizeResult<()> {
        let path = artifact_key("xml");
        self.raw = Some(self.storage.create_writer(&path).await?);
        self.raw_path = Some(path);
        Ok(())
    }

    async fn write(&mut self, chunk: &str) -> NormalizeResult<()> {
        let raw = match (&self.raw_path, self.raw.as_mut()) {
            (None, _) => return Err(NormalizeError::NotCreated),
            (Some(_), None) => return Err(NormalizeError::HandleClosed),
            (Some(_), Some(raw)) => raw,
        };
        raw.write_all(chunk.as_bytes()).await?;
        Ok(())
    }

    async fn finalize(&mut self) -> NormalizeResult<(String, usize)> {
        let raw_path = self.raw_path.clone().ok_or(NormalizeError::NotCreated)?;
        let mut raw = self.raw.take().ok_or(NormalizeError::HandleClosed)?;
        raw.shutdown().await?;

        let layout = scan_layout(self.storage.as_ref(), &raw_path).await?;

        let mut writer =
            JsonArrayWriter::create(self.storage.as_ref(), artifact_key("json")).await?;
        self.output_path = Some(writer.path().to_string());

        let mut reader = open_markup(self.storage.as_ref(), &raw_path).await?;
        let mut assembler = Assembler::new(layout);
        let mut buf = Vec::new();
        loop {
            let event = reader
                .read_event_into_async(&mut buf)
                .await
                .map_err(|e| xml_error(&reader, e))?;
            if matches!(event, Event::Eof) {
                break;
            }
            if let Some(record) = assembler.feed(event)? {
                writer.write_record(&record).await?;
            }
            buf.clear();
        }
        for record in assembler.finish()? {
            writer.write_record(&record).await?;
        }
        let count = writer.finish().await?;

        self.storage.delete_file(&raw_path).await?;
        Ok((writer.path().to_string(), count))
    }

    fn artifact_paths(&self) -> Vec<String> {
        self.raw_path
            .iter()
            .chain(self.output_path.iter())
            .cloned()
            .collect()
    }
}

type MarkupReader = Reader<BufReader<ArtifactReader>>;

async fn open_markup(storage: &dyn StorageBackend, path: &str) -> NormalizeResult<MarkupReader> {
    let mut reader = Reader::from_reader(BufReader::new(storage.open_reader(path).await?));
    reader.config_mut().trim_text(true);
    Ok(reader)
}

fn xml_error<R>(reader: &Reader<R>, e: quick_xml::Error) -> NormalizeError {
    NormalizeError::Xml(format!("{} at position {}", e, reader.error_position()))
}

/// First pass: only the root's child tags are looked at
async fn scan_layout(storage: &dyn StorageBackend, path: &str) -> NormalizeResult<RootLayout> {
    let mut reader = open_markup(storage, path).await?;
    let mut scan = LayoutScan::default();
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into_async(&mut buf)
            .await
            .map_err(|e| xml_error(&reader, e))?;
        if matches!(event, Event::Eof) {
            break;
        }
        scan.observe(&event);
        buf.clear();
    }
    Ok(scan.layout())
}

/// How the root element turns into records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootLayout {
    /// Several children sharing one tag; each child is a record
    Repeated,
    /// The root converts to one value
    Whole,
}

#[derive(Default)]
struct LayoutScan {
    depth: usize,
    first: Option<String>,
    children: usize,
    shared: bool,
}

impl LayoutScan {
    fn observe(&mut self, event: &Event<'_>) {
        match event {
            Event::Start(e) => {
                if self.depth == 1 {
                    self.child(e.name().as_ref());
                }
                self.depth += 1;
            }
            Event::Empty(e) if self.depth == 1 => self.child(e.name().as_ref()),
            Event::End(_) => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn child(&mut self, tag: &[u8]) {
        self.children += 1;
        match &self.first {
            None => {
                self.first = Some(String::from_utf8_lossy(tag).to_string());
                self.shared = true;
            }
            Some(first) => self.shared &= first.as_bytes() == tag,
        }
    }

    fn layout(&self) -> RootLayout {
        if self.children > 1 && self.shared {
            RootLayout::Repeated
        } else {
            RootLayout::Whole
        }
    }
}

struct Frame {
    tag: String,
    text: String,
    children: Vec<(String, Value)>,
}

impl Frame {
    fn new(tag: String) -> Self {
        Self {
            tag,
            text: String::new(),
            children: Vec::new(),
        }
    }

    fn into_value(self) -> Value {
        if self.children.is_empty() {
            return Value::String(self.text.trim().to_string());
        }

        let first = &self.children[0].0;
        if self.children.len() > 1 && self.children.iter().all(|(tag, _)| tag == first) {
            return Value::Array(self.children.into_iter().map(|(_, v)| v).collect());
        }

        let mut object = Map::new();
        // tags already turned into arrays by repetition
        let mut promoted: HashSet<String> = HashSet::new();
        for (tag, value) in self.children {
            match object.get_mut(&tag) {
                None => {
                    object.insert(tag, value);
                }
                Some(Value::Array(items)) if promoted.contains(&tag) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                    promoted.insert(tag);
                }
            }
        }
        Value::Object(object)
    }
}

/// Builds values from markup events
///
/// A leaf element becomes its trimmed text. An element with several children
/// that all share one tag becomes an array of their values; otherwise an
/// object keyed by child tag, with repeated tags collected into arrays. A root
/// that converts to an object or a string is wrapped as a single record.
///
/// With [`RootLayout::Repeated`] each child of the root is handed back from
/// [`Assembler::feed`] as soon as it closes instead of being kept.
struct Assembler {
    layout: RootLayout,
    stack: Vec<Frame>,
    root: Option<Value>,
    closed: bool,
}

impl Assembler {
    fn new(layout: RootLayout) -> Self {
        Self {
            layout,
            stack: Vec::new(),
            root: None,
            closed: false,
        }
    }

    fn feed(&mut self, event: Event<'_>) -> NormalizeResult<Option<Value>> {
        match event {
            Event::Start(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                self.stack.push(Frame::new(tag));
                Ok(None)
            }
            Event::Empty(ref e) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                self.complete(tag, Value::String(String::new()))
            }
            Event::Text(ref t) => {
                if let Some(frame) = self.stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| NormalizeError::Xml(e.to_string()))?;
                    frame.text.push_str(&text);
                }
                Ok(None)
            }
            Event::CData(ref c) => {
                if let Some(frame) = self.stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(c));
                }
                Ok(None)
            }
            Event::End(_) => {
                let frame = self
                    .stack
                    .pop()
                    .ok_or_else(|| NormalizeError::Xml("unbalanced closing tag".to_string()))?;
                let tag = frame.tag.clone();
                self.complete(tag, frame.into_value())
            }
            _ => Ok(None),
        }
    }

    fn complete(&mut self, tag: String, value: Value) -> NormalizeResult<Option<Value>> {
        if self.layout == RootLayout::Repeated && self.stack.len() == 1 {
            return Ok(Some(value));
        }
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push((tag, value));
                Ok(None)
            }
            None if !self.closed => {
                self.closed = true;
                if self.layout == RootLayout::Whole {
                    self.root = Some(value);
                }
                Ok(None)
            }
            None => Err(NormalizeError::Xml(format!(
                "unexpected second root element <{}>",
                tag
            ))),
        }
    }

    /// Records still held once the document ended
    fn finish(self) -> NormalizeResult<Vec<Value>> {
        if let Some(open) = self.stack.last() {
            return Err(NormalizeError::Xml(format!("unclosed element <{}>", open.tag)));
        }
        if !self.closed {
            return Err(NormalizeError::Xml("document has no root element".to_string()));
        }
        Ok(match self.root {
            Some(Value::Array(items)) => items,
            Some(value) => vec![value],
            None => Vec::new(),
        })
    }
}
