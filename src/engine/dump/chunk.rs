//! Источники и приёмники байтов, не требующие держать весь контейнер
//! одним непрерывным буфером.
//!
//! - [`ChunkSource`]: чтение произвольного диапазона (файл, `Bytes`,
//!   готовый [`Container`]);
//! - [`ChunkSink`]: накопление байтов с «запечатыванием» неизменяемых
//!   фрагментов по достижении порога;
//! - [`Container`]: логическая конкатенация фрагментов без копирования.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tabledump_error::{DumpError, TabledumpResult};

/// Порог запечатывания фрагмента по умолчанию (1 MiB).
pub const DEFAULT_FRAGMENT_BYTES: usize = 1 << 20;

/// Последовательный буфер, читаемый диапазонами.
pub trait ChunkSource {
    /// Полный размер в байтах.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Байты диапазона `[offset, offset + length)`. Диапазон за концом
    /// буфера обрезается; `offset >= len()` даёт пустой результат.
    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes>;
}

impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes> {
        let (start, end) = clamp_range(ChunkSource::len(self), offset, length);
        Ok(self.slice(start..end))
    }
}

impl<S: ChunkSource + ?Sized> ChunkSource for &S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes> {
        (**self).read_range(offset, length)
    }
}

fn clamp_range(
    total: u64,
    offset: u64,
    length: usize,
) -> (usize, usize) {
    let start = offset.min(total);
    let end = offset.saturating_add(length as u64).min(total);
    (start as usize, end as usize)
}

/// Файл на диске, читаемый по диапазонам.
#[derive(Debug)]
pub struct FileSource {
    file: Mutex<File>,
    len: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> TabledumpResult<Self> {
        let file = File::open(path)?;
        Self::from_file(file)
    }

    pub fn from_file(file: File) -> TabledumpResult<Self> {
        let len = file.metadata()?.len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes> {
        let (start, end) = clamp_range(self.len, offset, length);
        let mut buf = vec![0u8; end - start];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(start as u64))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// Накопитель байтов с запечатыванием фрагментов.
#[derive(Debug)]
pub struct ChunkSink {
    threshold: usize,
    buffer: BytesMut,
    fragments: Vec<Bytes>,
    sealed_len: u64,
}

impl ChunkSink {
    /// `threshold`: размер, по достижении которого текущий буфер
    /// становится неизменяемым фрагментом. Ноль трактуется как единица.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            buffer: BytesMut::with_capacity(threshold.min(DEFAULT_FRAGMENT_BYTES)),
            fragments: Vec::new(),
            sealed_len: 0,
        }
    }

    pub fn append(
        &mut self,
        bytes: &[u8],
    ) {
        self.buffer.extend_from_slice(bytes);
        if self.buffer.len() >= self.threshold {
            self.seal();
        }
    }

    /// Сколько байт записано всего.
    pub fn len(&self) -> u64 {
        self.sealed_len + self.buffer.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Число уже запечатанных фрагментов.
    pub fn sealed_fragments(&self) -> usize {
        self.fragments.len()
    }

    fn seal(&mut self) {
        let fragment = self.buffer.split().freeze();
        self.sealed_len += fragment.len() as u64;
        self.fragments.push(fragment);
    }

    /// Склеивает фрагменты и хвост буфера в один [`Container`].
    pub fn finalize(mut self) -> Container {
        if !self.buffer.is_empty() {
            self.seal();
        }
        Container::from_fragments(self.fragments)
    }
}

impl Default for ChunkSink {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_BYTES)
    }
}

impl Write for ChunkSink {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Готовый контейнер: неизменяемая последовательность фрагментов.
#[derive(Clone, Debug, Default)]
pub struct Container {
    fragments: Vec<Bytes>,
    /// Смещение начала каждого фрагмента.
    starts: Vec<u64>,
    len: u64,
}

impl Container {
    pub fn from_fragments(fragments: Vec<Bytes>) -> Self {
        let mut starts = Vec::with_capacity(fragments.len());
        let mut len = 0u64;
        let fragments: Vec<Bytes> = fragments.into_iter().filter(|f| !f.is_empty()).collect();
        for fragment in &fragments {
            starts.push(len);
            len += fragment.len() as u64;
        }
        Self {
            fragments,
            starts,
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn fragments(&self) -> &[Bytes] {
        &self.fragments
    }

    /// Пишет содержимое во внешний приёмник фрагмент за фрагментом.
    pub fn write_to<W: Write>(
        &self,
        mut out: W,
    ) -> io::Result<()> {
        for fragment in &self.fragments {
            out.write_all(fragment)?;
        }
        out.flush()
    }

    /// Копирует весь контейнер в один вектор.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len as usize);
        for fragment in &self.fragments {
            out.extend_from_slice(fragment);
        }
        out
    }

    /// Содержимое как UTF-8 текст.
    pub fn to_text(&self) -> TabledumpResult<String> {
        String::from_utf8(self.to_vec()).map_err(|e| {
            DumpError::MalformedContainer {
                reason: format!("container is not valid UTF-8: {e}"),
            }
            .into()
        })
    }
}

impl From<Bytes> for Container {
    fn from(bytes: Bytes) -> Self {
        Self::from_fragments(vec![bytes])
    }
}

impl From<Vec<u8>> for Container {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl ChunkSource for Container {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(
        &self,
        offset: u64,
        length: usize,
    ) -> TabledumpResult<Bytes> {
        let (start, end) = clamp_range(self.len, offset, length);
        if start == end {
            return Ok(Bytes::new());
        }
        let (start, end) = (start as u64, end as u64);
        let first = self.starts.partition_point(|&s| s <= start) - 1;

        let fragment_start = self.starts[first];
        let fragment = &self.fragments[first];
        if end <= fragment_start + fragment.len() as u64 {
            let from = (start - fragment_start) as usize;
            let to = (end - fragment_start) as usize;
            return Ok(fragment.slice(from..to));
        }

        // Диапазон пересекает границу фрагментов.
        let mut out = BytesMut::with_capacity((end - start) as usize);
        for (i, fragment) in self.fragments.iter().enumerate().skip(first) {
            let fs = self.starts[i];
            if fs >= end {
                break;
            }
            let from = start.saturating_sub(fs) as usize;
            let to = ((end - fs) as usize).min(fragment.len());
            out.extend_from_slice(&fragment[from..to]);
        }
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_seals_at_threshold() {
        let mut sink = ChunkSink::new(4);
        sink.append(b"ab");
        assert_eq!(sink.sealed_fragments(), 0);
        sink.append(b"cd");
        assert_eq!(sink.sealed_fragments(), 1);
        sink.append(b"efghij");
        assert_eq!(sink.sealed_fragments(), 2);
        sink.append(b"k");

        let container = sink.finalize();
        assert_eq!(container.fragment_count(), 3);
        assert_eq!(container.len(), 11);
        assert_eq!(container.to_vec(), b"abcdefghijk");
    }

    #[test]
    fn test_sink_implements_write() {
        let mut sink = ChunkSink::new(2);
        write!(sink, "{}-{}", 12, 34).unwrap();
        assert_eq!(sink.finalize().to_text().unwrap(), "12-34");
    }

    #[test]
    fn test_empty_sink() {
        let container = ChunkSink::default().finalize();
        assert!(container.is_empty());
        assert_eq!(container.fragment_count(), 0);
        assert_eq!(container.read_range(0, 10).unwrap().len(), 0);
    }

    #[test]
    fn test_container_ranges_across_fragments() {
        let container = Container::from_fragments(vec![
            Bytes::from_static(b"abc"),
            Bytes::from_static(b"def"),
            Bytes::from_static(b"gh"),
        ]);
        assert_eq!(&container.read_range(0, 3).unwrap()[..], b"abc");
        assert_eq!(&container.read_range(1, 4).unwrap()[..], b"bcde");
        assert_eq!(&container.read_range(2, 100).unwrap()[..], b"cdefgh");
        assert_eq!(&container.read_range(7, 1).unwrap()[..], b"h");
        assert!(container.read_range(8, 1).unwrap().is_empty());
    }

    #[test]
    fn test_container_write_to() {
        let container =
            Container::from_fragments(vec![Bytes::from_static(b"x"), Bytes::from_static(b"yz")]);
        let mut out = Vec::new();
        container.write_to(&mut out).unwrap();
        assert_eq!(out, b"xyz");
    }

    #[test]
    fn test_bytes_source_clamps() {
        let source = Bytes::from_static(b"hello");
        assert_eq!(&source.read_range(3, 10).unwrap()[..], b"lo");
        assert!(source.read_range(9, 1).unwrap().is_empty());
    }

    #[test]
    fn test_file_source_reads_ranges() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        let source = FileSource::from_file(file).unwrap();
        assert_eq!(source.len(), 10);
        assert_eq!(&source.read_range(4, 3).unwrap()[..], b"456");
        assert_eq!(&source.read_range(8, 5).unwrap()[..], b"89");
    }
}
