use std::{
    fs::File,
    io::{BufReader, BufWriter, Cursor, Read, Result as IoResult, Seek, Write},
    path::PathBuf,
    sync::Arc,
};

use ngram_store_base::{Error, Result};

pub trait Reader: Read + Seek + Send + Sized {
    fn try_clone_independent(&self) -> IoResult<Self>;
}

pub trait Writer: Write + Seek + Send + Sized {
    type PairedReader: Reader;
    fn try_into_reader(self) -> IoResult<Self::PairedReader>;
}

/// Little-endian primitive reads, layered over any `Reader`.
///
/// Every `read_*` turns the bare `std::io::Error` a short read produces into
/// `Error::CorruptStream`, since a `load` that runs out of bytes mid-field
/// means the stream was truncated or never had this shape to begin with.
pub trait LeRead: Read {
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)
            .map_err(|_| Error::corrupt_stream("unexpected end of stream reading u8"))?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)
            .map_err(|_| Error::corrupt_stream("unexpected end of stream reading u32"))?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)
            .map_err(|_| Error::corrupt_stream("unexpected end of stream reading u64"))?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_u32_vec(&mut self, len: usize) -> Result<Vec<u32>> {
        (0..len).map(|_| self.read_u32()).collect()
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)
            .map_err(|_| Error::corrupt_stream("unexpected end of stream reading byte slice"))?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> LeRead for R {}

pub trait LeWrite: Write {
    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_all(&[v])?;
        Ok(())
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn write_u32_slice(&mut self, v: &[u32]) -> Result<()> {
        for x in v {
            self.write_u32(*x)?;
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> LeWrite for W {}

// MemReader

pub struct MemReader {
    mem: Cursor<Arc<[u8]>>,
}

impl MemReader {
    fn new(mem: Arc<[u8]>) -> Self {
        Self {
            mem: Cursor::new(mem),
        }
    }
}

impl From<Vec<u8>> for MemReader {
    fn from(vec: Vec<u8>) -> Self {
        let rc: Arc<[u8]> = Arc::from(vec);
        Self::new(rc)
    }
}

impl Read for MemReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.mem.read(buf)
    }
}

impl Seek for MemReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> IoResult<u64> {
        self.mem.seek(pos)
    }
}

impl Reader for MemReader {
    fn try_clone_independent(&self) -> IoResult<Self> {
        let rc = self.mem.get_ref().clone();
        Ok(Self::new(rc))
    }
}

// MemWriter

#[derive(Default)]
pub struct MemWriter {
    mem: Cursor<Vec<u8>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.mem.into_inner()
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.mem.write(buf)
    }
    fn flush(&mut self) -> IoResult<()> {
        self.mem.flush()
    }
}

impl Seek for MemWriter {
    fn seek(&mut self, pos: std::io::SeekFrom) -> IoResult<u64> {
        self.mem.seek(pos)
    }
}

impl Writer for MemWriter {
    type PairedReader = MemReader;
    fn try_into_reader(self) -> IoResult<Self::PairedReader> {
        let mem = self.mem.into_inner();
        let rc: Arc<[u8]> = Arc::from(mem);
        Ok(MemReader {
            mem: Cursor::new(rc),
        })
    }
}

// FileReader

pub struct FileReader {
    file: BufReader<File>,
    path: PathBuf,
}

impl FileReader {
    pub fn try_open_existing(path: PathBuf) -> IoResult<Self> {
        let file = File::open(&path)?;
        let file = BufReader::new(file);
        Ok(Self { file, path })
    }
}
impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> IoResult<u64> {
        self.file.seek(pos)
    }
}

impl Reader for FileReader {
    fn try_clone_independent(&self) -> IoResult<Self> {
        FileReader::try_open_existing(self.path.clone())
    }
}

// FileWriter

pub struct FileWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl FileWriter {
    pub fn try_create_non_existing(path: PathBuf) -> IoResult<Self> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let file = BufWriter::new(file);
        Ok(Self { file, path })
    }

    /// Overwrites an existing file (or creates it). `dump_to_file` wants this
    /// rather than `try_create_non_existing`'s exclusive-create semantics.
    pub fn create_or_truncate(path: PathBuf) -> IoResult<Self> {
        let file = File::create(&path)?;
        let file = BufWriter::new(file);
        Ok(Self { file, path })
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> IoResult<()> {
        self.file.flush()
    }
}
impl Seek for FileWriter {
    fn seek(&mut self, pos: std::io::SeekFrom) -> IoResult<u64> {
        self.file.seek(pos)
    }
}

impl Writer for FileWriter {
    type PairedReader = FileReader;
    fn try_into_reader(self) -> IoResult<Self::PairedReader> {
        let Self { mut file, path } = self;
        // Make extra sure we've flushed-and-closed before
        // opening to read.
        file.flush()?;
        let file = file.into_inner()?;
        file.sync_all()?;
        drop(file);
        FileReader::try_open_existing(path)
    }
}
