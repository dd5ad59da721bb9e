//! Binary weight files.
//!
//! Layout: a 32-byte [`Header`] followed by 12 tensors in the order of
//! [`TENSOR_NAMES`]. Each tensor is `rows: u32, cols: u32` and then
//! `rows * cols` `f32` values, row major. Integers and floats use the
//! writer's byte order; the header's byte-order mark lets a reader on the
//! other order refuse the file instead of decoding garbage.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use memmap2::MmapOptions;
use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::model::{Decoder, Embedding, Encoder, Gru, Linear, Seq2Seq, Seq2SeqArgs};

pub const MAGIC: [u8; 8] = *b"MAEUMS2S";
pub const BYTE_ORDER_MARK: u32 = 0x0102_0304;
pub const FORMAT_VERSION: u32 = 1;

pub const TENSOR_NAMES: [&str; 12] = [
    "encoder.embedding",
    "encoder.gru.input.weight",
    "encoder.gru.input.bias",
    "encoder.gru.recurrent.weight",
    "encoder.gru.recurrent.bias",
    "decoder.embedding",
    "decoder.gru.input.weight",
    "decoder.gru.input.bias",
    "decoder.gru.recurrent.weight",
    "decoder.gru.recurrent.bias",
    "decoder.head.weight",
    "decoder.head.bias",
];

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Header {
    pub magic: [u8; 8],
    pub byte_order: u32,
    pub version: u32,
    pub vocab_size: u32,
    pub embed_dim: u32,
    pub hidden_dim: u32,
    pub reserved: u32,
}

impl Header {
    fn for_args(args: &Seq2SeqArgs) -> ChatResult<Self> {
        Ok(Self {
            magic: MAGIC,
            byte_order: BYTE_ORDER_MARK,
            version: FORMAT_VERSION,
            vocab_size: to_u32(args.vocab_size)?,
            embed_dim: to_u32(args.embed_dim)?,
            hidden_dim: to_u32(args.hidden_dim)?,
            reserved: 0,
        })
    }

    fn args(&self) -> Seq2SeqArgs {
        Seq2SeqArgs {
            vocab_size: self.vocab_size as usize,
            embed_dim: self.embed_dim as usize,
            hidden_dim: self.hidden_dim as usize,
        }
    }
}

fn to_u32(v: usize) -> ChatResult<u32> {
    u32::try_from(v).map_err(|_| ChatError::Config(format!("dimension {v} does not fit in u32")))
}

fn write_tensor<W: Write>(w: &mut W, rows: usize, cols: usize, data: &[f32]) -> std::io::Result<()> {
    w.write_all(bytemuck::bytes_of(&(rows as u32)))?;
    w.write_all(bytemuck::bytes_of(&(cols as u32)))?;
    w.write_all(bytemuck::cast_slice(data))
}

fn write_matrix<W: Write>(w: &mut W, m: &Array2<f32>) -> std::io::Result<()> {
    let data: Vec<f32> = m.iter().copied().collect();
    write_tensor(w, m.nrows(), m.ncols(), &data)
}

fn write_vector<W: Write>(w: &mut W, v: &Array1<f32>) -> std::io::Result<()> {
    let data: Vec<f32> = v.iter().copied().collect();
    write_tensor(w, 1, v.len(), &data)
}

fn write_linear<W: Write>(w: &mut W, l: &Linear) -> std::io::Result<()> {
    write_matrix(w, l.weight())?;
    write_vector(w, l.bias())
}

fn write_gru<W: Write>(w: &mut W, g: &Gru) -> std::io::Result<()> {
    write_linear(w, g.input())?;
    write_linear(w, g.recurrent())
}

/// Serialise `model` to `path`.
pub fn save<P: AsRef<Path>>(model: &Seq2Seq, path: P) -> ChatResult<()> {
    let path = path.as_ref();
    let header = Header::for_args(&model.args)?;
    let write = || -> std::io::Result<()> {
        let mut f = BufWriter::new(File::create(path)?);
        f.write_all(bytemuck::bytes_of(&header))?;
        write_matrix(&mut f, model.encoder().embed().weight())?;
        write_gru(&mut f, model.encoder().gru())?;
        write_matrix(&mut f, model.decoder().embed().weight())?;
        write_gru(&mut f, model.decoder().gru())?;
        write_linear(&mut f, model.decoder().head())?;
        f.flush()
    };
    write().map_err(|e| ChatError::io(path, e))?;
    debug!(path = %path.display(), "saved weights");
    Ok(())
}

/// Cursor over the raw file bytes.
struct Reader<'a> {
    path: &'a Path,
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> ChatResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                ChatError::artifact(self.path, format!("truncated while reading {what}"))
            })?;
        let bytes = &self.buf[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn u32(&mut self, what: &str) -> ChatResult<u32> {
        Ok(bytemuck::pod_read_unaligned(self.take(4, what)?))
    }

    fn header(&mut self) -> ChatResult<Header> {
        let header: Header =
            bytemuck::pod_read_unaligned(self.take(std::mem::size_of::<Header>(), "header")?);
        if header.magic != MAGIC {
            return Err(ChatError::artifact(self.path, "not a seq2seq weight file"));
        }
        if header.byte_order != BYTE_ORDER_MARK {
            return Err(ChatError::artifact(
                self.path,
                "written on a machine with a different byte order",
            ));
        }
        if header.version != FORMAT_VERSION {
            return Err(ChatError::artifact(
                self.path,
                format!("unsupported format version {}", header.version),
            ));
        }
        Ok(header)
    }

    fn tensor(&mut self, name: &str, expected: (usize, usize)) -> ChatResult<Array2<f32>> {
        let rows = self.u32(name)? as usize;
        let cols = self.u32(name)? as usize;
        if (rows, cols) != expected {
            return Err(ChatError::ShapeMismatch {
                tensor: name.to_string(),
                expected,
                got: (rows, cols),
            });
        }
        let len = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| ChatError::artifact(self.path, format!("{name} is too large")))?;
        let bytes = self.take(len, name)?;
        let data: Vec<f32> = bytes
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| ChatError::artifact(self.path, format!("{name}: {e}")))
    }

    fn vector(&mut self, name: &str, len: usize) -> ChatResult<Array1<f32>> {
        let m = self.tensor(name, (1, len))?;
        Ok(m.row(0).to_owned())
    }

    fn linear(&mut self, names: [&str; 2], out: usize, inp: usize) -> ChatResult<Linear> {
        let weight = self.tensor(names[0], (out, inp))?;
        let bias = self.vector(names[1], out)?;
        Linear::from_parts(weight, bias)
    }

    fn gru(&mut self, names: &[&str], inp: usize, units: usize) -> ChatResult<Gru> {
        let input = self.linear([names[0], names[1]], 3 * units, inp)?;
        let recurrent = self.linear([names[2], names[3]], 3 * units, units)?;
        Gru::from_parts(input, recurrent)
    }
}

/// Decode a weight file already in memory.
pub fn from_bytes(path: &Path, bytes: &[u8]) -> ChatResult<Seq2Seq> {
    let mut r = Reader {
        path,
        buf: bytes,
        offset: 0,
    };
    let args = r.header()?.args();
    let (v, e, h) = (args.vocab_size, args.embed_dim, args.hidden_dim);

    let encoder = Encoder::new(
        Embedding::from_weight(r.tensor(TENSOR_NAMES[0], (v, e))?),
        r.gru(&TENSOR_NAMES[1..5], e, h)?,
    );
    let decoder = Decoder::new(
        Embedding::from_weight(r.tensor(TENSOR_NAMES[5], (v, e))?),
        r.gru(&TENSOR_NAMES[6..10], e, h)?,
        r.linear([TENSOR_NAMES[10], TENSOR_NAMES[11]], v, h)?,
    );
    if r.offset != bytes.len() {
        return Err(ChatError::artifact(
            path,
            format!("{} trailing bytes", bytes.len() - r.offset),
        ));
    }
    Seq2Seq::from_parts(args, encoder, decoder)
}

/// Read the whole file into memory and decode it.
pub fn load<P: AsRef<Path>>(path: P) -> ChatResult<Seq2Seq> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| ChatError::io(path, e))?;
    from_bytes(path, &bytes)
}

/// Decode through a memory map.
pub fn load_mmap<P: AsRef<Path>>(path: P) -> ChatResult<Seq2Seq> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ChatError::io(path, e))?;
    // SAFETY: the map is read-only and dropped before returning; tensors are
    // copied out, so later changes to the file cannot alias loaded weights.
    let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| ChatError::io(path, e))?;
    from_bytes(path, &mmap[..])
}

/// Memory-mapped load, falling back to a plain read when mapping fails.
pub fn load_weights<P: AsRef<Path>>(path: P) -> ChatResult<Seq2Seq> {
    let path = path.as_ref();
    match load_mmap(path) {
        Err(ChatError::Io { source, .. }) if path.is_file() => {
            debug!(path = %path.display(), error = %source, "mmap failed, reading file");
            load(path)
        }
        other => other,
    }
}
