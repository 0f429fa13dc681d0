//! Потоковый структурный разбор JSON поверх [`ChunkSource`].
//!
//! Токенизатор читает источник окнами фиксированного размера и никогда не
//! держит в памяти больше одного окна плюс хвост незавершённого токена.
//! Токен, разрезанный границей окна, дочитывается из следующего окна.

use serde_json::{Map, Value as Json};
use tabledump_error::{DumpError, TabledumpResult};

use super::chunk::ChunkSource;
use crate::engine::TransactionLease;

/// Размер окна чтения по умолчанию (64 KiB).
pub const DEFAULT_WINDOW_BYTES: usize = 64 * 1024;

/// Предельная глубина вложенности массивов и объектов по умолчанию.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Структурный токен JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    ObjectStart,
    ObjectEnd,
    ArrayStart,
    ArrayEnd,
    /// Имя свойства объекта; двоеточие уже поглощено.
    Key(String),
    /// Строка, число, `true`, `false` или `null`.
    Scalar(Json),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    ValueOrArrayEnd,
    Key,
    KeyOrObjectEnd,
    CommaOrEnd,
    Eof,
}

pub struct Tokenizer<S> {
    source: S,
    window: usize,
    buf: Vec<u8>,
    pos: usize,
    /// Абсолютное смещение `buf[0]` в источнике.
    buf_offset: u64,
    next_read: u64,
    stack: Vec<Frame>,
    max_depth: usize,
    expect: Expect,
    peeked: Option<Token>,
    failed: Option<DumpError>,
    lease: Option<TransactionLease>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<S: ChunkSource> Tokenizer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            window: DEFAULT_WINDOW_BYTES,
            buf: Vec::new(),
            pos: 0,
            buf_offset: 0,
            next_read: 0,
            stack: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            expect: Expect::Value,
            peeked: None,
            failed: None,
            lease: None,
        }
    }

    /// Размер окна чтения; ноль трактуется как единица.
    pub fn with_window(
        mut self,
        window: usize,
    ) -> Self {
        self.window = window.max(1);
        self
    }

    /// Предельная глубина вложенности; более глубокий документ отвергается
    /// как некорректный JSON ещё до того, как поддерево будет собрано.
    pub fn with_max_depth(
        mut self,
        max_depth: usize,
    ) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Аренда транзакции, продлеваемая перед каждым чтением окна.
    pub fn with_lease(
        mut self,
        lease: TransactionLease,
    ) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn set_lease(
        &mut self,
        lease: Option<TransactionLease>,
    ) {
        self.lease = lease;
    }

    /// Сколько байт источника уже поглощено токенами.
    pub fn position(&self) -> u64 {
        self.buf_offset + self.pos as u64
    }

    /// Глубина вложенности текущей позиции.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Следующий токен; `None`: корректный конец документа.
    pub fn next(&mut self) -> TabledumpResult<Option<Token>> {
        if let Some(token) = self.peeked.take() {
            return Ok(Some(token));
        }
        self.advance(true)
    }

    /// Следующий токен без продвижения.
    pub fn peek(&mut self) -> TabledumpResult<Option<&Token>> {
        if self.peeked.is_none() {
            self.peeked = self.advance(true)?;
        }
        Ok(self.peeked.as_ref())
    }

    /// Пропускает одно значение целиком, не собирая его в памяти.
    pub fn skip_value(&mut self) -> TabledumpResult<()> {
        let first = match self.peeked.take() {
            Some(token) => Some(token),
            None => self.advance(false)?,
        };
        let mut depth = match first {
            Some(Token::Scalar(_)) => return Ok(()),
            Some(Token::ObjectStart | Token::ArrayStart) => 1usize,
            other => return Err(self.expected_value(other)),
        };
        while depth > 0 {
            match self.advance(false)? {
                Some(Token::ObjectStart | Token::ArrayStart) => depth += 1,
                Some(Token::ObjectEnd | Token::ArrayEnd) => depth -= 1,
                Some(_) => {}
                None => return Err(self.error("unexpected end of input")),
            }
        }
        Ok(())
    }

    /// Собирает ровно одно значение как обычный JSON.
    pub fn read_value(&mut self) -> TabledumpResult<Json> {
        match self.next()? {
            Some(Token::Scalar(value)) => Ok(value),
            Some(Token::ObjectStart) => {
                let mut map = Map::new();
                loop {
                    match self.next()? {
                        Some(Token::Key(key)) => {
                            let value = self.read_value()?;
                            map.insert(key, value);
                        }
                        Some(Token::ObjectEnd) => return Ok(Json::Object(map)),
                        other => return Err(self.expected_value(other)),
                    }
                }
            }
            Some(Token::ArrayStart) => {
                let mut items = Vec::new();
                loop {
                    if let Some(Token::ArrayEnd) = self.peek()? {
                        self.peeked = None;
                        return Ok(Json::Array(items));
                    }
                    items.push(self.read_value()?);
                }
            }
            other => Err(self.expected_value(other)),
        }
    }

    fn expected_value(
        &self,
        found: Option<Token>,
    ) -> tabledump_error::StackError {
        DumpError::MalformedContainer {
            reason: format!(
                "expected a value at byte {}, found {}",
                self.position(),
                describe(found.as_ref())
            ),
        }
        .into()
    }

    fn fail(
        &mut self,
        err: DumpError,
    ) -> tabledump_error::StackError {
        self.failed = Some(err.clone());
        err.into()
    }

    fn error(
        &mut self,
        reason: impl Into<String>,
    ) -> tabledump_error::StackError {
        let err = DumpError::json(reason, self.position());
        self.fail(err)
    }

    ////////////////////////////////////////////////////////////////////////////
    // Лексер
    ////////////////////////////////////////////////////////////////////////////

    /// Дочитывает следующее окно, отбрасывая поглощённый префикс буфера.
    fn fill(&mut self) -> TabledumpResult<bool> {
        if self.next_read >= self.source.len() {
            return Ok(false);
        }
        if let Some(lease) = &self.lease {
            lease.renew();
        }
        self.buf.drain(..self.pos);
        self.buf_offset += self.pos as u64;
        self.pos = 0;

        let chunk = self.source.read_range(self.next_read, self.window)?;
        if chunk.is_empty() {
            return Ok(false);
        }
        self.next_read += chunk.len() as u64;
        self.buf.extend_from_slice(&chunk);
        Ok(true)
    }

    fn skip_ws(&mut self) -> TabledumpResult<Option<u8>> {
        loop {
            while let Some(&b) = self.buf.get(self.pos) {
                if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                    self.pos += 1;
                } else {
                    return Ok(Some(b));
                }
            }
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Длина строкового литерала, начинающегося с `buf[pos]`, с кавычками.
    fn scan_string(&mut self) -> TabledumpResult<usize> {
        let mut rel = 1;
        loop {
            while self.pos + rel < self.buf.len() {
                match self.buf[self.pos + rel] {
                    b'\\' => rel += 2,
                    b'"' => return Ok(rel + 1),
                    b if b < 0x20 => return Err(self.error("control character in string")),
                    _ => rel += 1,
                }
            }
            if !self.fill()? {
                return Err(self.error("unterminated string"));
            }
        }
    }

    /// Длина числа или литерала `true`/`false`/`null`.
    fn scan_bare(&mut self) -> TabledumpResult<usize> {
        let mut rel = 0;
        loop {
            while let Some(&b) = self.buf.get(self.pos + rel) {
                if is_delimiter(b) {
                    return Ok(rel);
                }
                rel += 1;
            }
            if !self.fill()? {
                return Ok(rel);
            }
        }
    }

    fn parse_slice<T: serde::de::DeserializeOwned>(
        &mut self,
        len: usize,
    ) -> TabledumpResult<T> {
        let parsed = serde_json::from_slice::<T>(&self.buf[self.pos..self.pos + len]);
        match parsed {
            Ok(value) => {
                self.pos += len;
                Ok(value)
            }
            Err(e) => Err(self.error(format!("invalid token: {e}"))),
        }
    }

    fn after_value(&mut self) {
        self.expect = if self.stack.is_empty() {
            Expect::Eof
        } else {
            Expect::CommaOrEnd
        };
    }

    fn open(
        &mut self,
        frame: Frame,
    ) -> TabledumpResult<()> {
        if self.stack.len() >= self.max_depth {
            return Err(self.error(format!("nesting exceeds {} levels", self.max_depth)));
        }
        self.pos += 1;
        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.pos += 1;
        self.stack.pop();
        self.after_value();
    }

    fn advance(
        &mut self,
        materialize: bool,
    ) -> TabledumpResult<Option<Token>> {
        if let Some(err) = &self.failed {
            return Err(err.clone().into());
        }
        loop {
            match self.expect {
                Expect::Eof => {
                    return match self.skip_ws()? {
                        None => Ok(None),
                        Some(_) => Err(self.error("trailing characters after document")),
                    };
                }
                Expect::CommaOrEnd => {
                    let Some(b) = self.skip_ws()? else {
                        return Err(self.error("unexpected end of input"));
                    };
                    match (b, self.stack.last()) {
                        (b',', Some(Frame::Object)) => {
                            self.pos += 1;
                            self.expect = Expect::Key;
                        }
                        (b',', Some(Frame::Array)) => {
                            self.pos += 1;
                            self.expect = Expect::Value;
                        }
                        (b'}', Some(Frame::Object)) => {
                            self.close();
                            return Ok(Some(Token::ObjectEnd));
                        }
                        (b']', Some(Frame::Array)) => {
                            self.close();
                            return Ok(Some(Token::ArrayEnd));
                        }
                        _ => return Err(self.error(format!("unexpected '{}'", b as char))),
                    }
                }
                Expect::Key | Expect::KeyOrObjectEnd => {
                    let Some(b) = self.skip_ws()? else {
                        return Err(self.error("unexpected end of input"));
                    };
                    if b == b'}' && self.expect == Expect::KeyOrObjectEnd {
                        self.close();
                        return Ok(Some(Token::ObjectEnd));
                    }
                    if b != b'"' {
                        return Err(self.error("expected property name"));
                    }
                    let len = self.scan_string()?;
                    let key = if materialize {
                        self.parse_slice::<String>(len)?
                    } else {
                        self.pos += len;
                        String::new()
                    };
                    match self.skip_ws()? {
                        Some(b':') => self.pos += 1,
                        _ => return Err(self.error("expected ':' after property name")),
                    }
                    self.expect = Expect::Value;
                    return Ok(Some(Token::Key(key)));
                }
                Expect::Value | Expect::ValueOrArrayEnd => {
                    let Some(b) = self.skip_ws()? else {
                        return Err(self.error("unexpected end of input"));
                    };
                    let token = match b {
                        b']' if self.expect == Expect::ValueOrArrayEnd => {
                            self.close();
                            return Ok(Some(Token::ArrayEnd));
                        }
                        b'{' => {
                            self.open(Frame::Object)?;
                            self.expect = Expect::KeyOrObjectEnd;
                            return Ok(Some(Token::ObjectStart));
                        }
                        b'[' => {
                            self.open(Frame::Array)?;
                            self.expect = Expect::ValueOrArrayEnd;
                            return Ok(Some(Token::ArrayStart));
                        }
                        b'"' => {
                            let len = self.scan_string()?;
                            if materialize {
                                Token::Scalar(self.parse_slice::<Json>(len)?)
                            } else {
                                self.pos += len;
                                Token::Scalar(Json::Null)
                            }
                        }
                        _ => {
                            let len = self.scan_bare()?;
                            if len == 0 {
                                return Err(self.error(format!("unexpected '{}'", b as char)));
                            }
                            Token::Scalar(self.parse_slice::<Json>(len)?)
                        }
                    };
                    self.after_value();
                    return Ok(Some(token));
                }
            }
        }
    }
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b' ' | b'\t' | b'\n' | b'\r' | b',' | b':' | b'[' | b']' | b'{' | b'}' | b'"'
    )
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of input".to_string(),
        Some(Token::Key(k)) => format!("property '{k}'"),
        Some(Token::ObjectEnd) => "'}'".to_string(),
        Some(Token::ArrayEnd) => "']'".to_string(),
        Some(other) => format!("{other:?}"),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
