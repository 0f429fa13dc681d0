//! Пошаговая запись JSON-документа в [`ChunkSink`].
//!
//! Разделители и ключи расставляются автоматически; нарушения структуры
//! (ключ внутри массива, значение без ключа внутри объекта, несовпадающая
//! закрывающая скобка, запись после закрытия корня) возвращают
//! `DumpError::InvalidWriterState`.

use serde_json::Value as Json;
use tabledump_error::{DumpError, GenericError, StatusCode, TabledumpResult};

use super::chunk::{ChunkSink, Container};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Array,
}

#[derive(Debug)]
struct Frame {
    kind: Kind,
    members: usize,
}

#[derive(Debug)]
pub struct DatasetWriter {
    sink: ChunkSink,
    stack: Vec<Frame>,
    root_written: bool,
    pretty: bool,
}

impl DatasetWriter {
    pub fn new(sink: ChunkSink) -> Self {
        Self {
            sink,
            stack: Vec::new(),
            root_written: false,
            pretty: false,
        }
    }

    /// Pretty-режим: каждый элемент объекта или массива на своей строке с
    /// отступом. Составные значения, записанные через `write_scalar`
    /// (строки таблиц, дескрипторы), остаются однострочными.
    pub fn pretty(
        mut self,
        pretty: bool,
    ) -> Self {
        self.pretty = pretty;
        self
    }

    /// Сколько байт уже записано.
    pub fn bytes_written(&self) -> u64 {
        self.sink.len()
    }

    pub fn begin_object(
        &mut self,
        key: Option<&str>,
    ) -> TabledumpResult<()> {
        self.before_value(key)?;
        self.sink.append(b"{");
        self.stack.push(Frame {
            kind: Kind::Object,
            members: 0,
        });
        Ok(())
    }

    pub fn end_object(&mut self) -> TabledumpResult<()> {
        self.close(Kind::Object, b"}")
    }

    pub fn begin_array(
        &mut self,
        key: Option<&str>,
    ) -> TabledumpResult<()> {
        self.before_value(key)?;
        self.sink.append(b"[");
        self.stack.push(Frame {
            kind: Kind::Array,
            members: 0,
        });
        Ok(())
    }

    pub fn end_array(&mut self) -> TabledumpResult<()> {
        self.close(Kind::Array, b"]")
    }

    /// Пишет готовое значение (скаляр или составное) одной строкой.
    pub fn write_scalar(
        &mut self,
        value: &Json,
        key: Option<&str>,
    ) -> TabledumpResult<()> {
        self.before_value(key)?;
        serde_json::to_writer(&mut self.sink, value).map_err(|e| {
            GenericError::new(StatusCode::EncodingError, format!("JSON encoding failed: {e}"))
        })?;
        if self.stack.is_empty() {
            self.root_written = true;
        }
        Ok(())
    }

    /// Проверяет, что документ закрыт, и возвращает контейнер.
    pub fn finish(self) -> TabledumpResult<Container> {
        if !self.root_written || !self.stack.is_empty() {
            return Err(invalid(format!(
                "document is not closed ({} open containers)",
                self.stack.len()
            )));
        }
        Ok(self.sink.finalize())
    }

    fn before_value(
        &mut self,
        key: Option<&str>,
    ) -> TabledumpResult<()> {
        if self.root_written {
            return Err(invalid("document root is already closed"));
        }
        let depth = self.stack.len();
        let Some(frame) = self.stack.last_mut() else {
            if key.is_some() {
                return Err(invalid("key given for the document root"));
            }
            return Ok(());
        };
        match (frame.kind, key) {
            (Kind::Object, None) => return Err(invalid("missing key inside an object")),
            (Kind::Array, Some(k)) => return Err(invalid(format!("key '{k}' inside an array"))),
            _ => {}
        }
        let first = frame.members == 0;
        frame.members += 1;

        if !first {
            self.sink.append(b",");
        }
        if self.pretty {
            self.newline(depth);
        }
        if let Some(k) = key {
            serde_json::to_writer(&mut self.sink, k).map_err(|e| {
                GenericError::new(StatusCode::EncodingError, format!("JSON encoding failed: {e}"))
            })?;
            self.sink.append(if self.pretty { b": " } else { b":" });
        }
        Ok(())
    }

    fn close(
        &mut self,
        kind: Kind,
        bracket: &[u8],
    ) -> TabledumpResult<()> {
        match self.stack.last() {
            Some(frame) if frame.kind == kind => {}
            Some(frame) => {
                return Err(invalid(format!(
                    "cannot close {kind:?} while {:?} is open",
                    frame.kind
                )))
            }
            None => return Err(invalid(format!("no open {kind:?} to close"))),
        }
        if let Some(frame) = self.stack.pop() {
            if self.pretty && frame.members > 0 {
                self.newline(self.stack.len());
            }
        }
        self.sink.append(bracket);
        if self.stack.is_empty() {
            self.root_written = true;
        }
        Ok(())
    }

    fn newline(
        &mut self,
        depth: usize,
    ) {
        self.sink.append(b"\n");
        for _ in 0..depth {
            self.sink.append(b"  ");
        }
    }
}

fn invalid(reason: impl Into<String>) -> tabledump_error::StackError {
    DumpError::InvalidWriterState {
        reason: reason.into(),
    }
    .into()
}
