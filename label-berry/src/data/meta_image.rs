//! MetaImage (`.mha` / `.mhd`) 体数据读写.
//!
//! 文件头是 `Key = Value` 的文本行, 以 `ElementDataFile` 结束. `.mha` 中
//! `ElementDataFile = LOCAL`, 数据紧随文件头; `.mhd` 中该键给出同目录下的数据文件名.
//! 数据按 x 变化最快的顺序存储, 恰好对应 `(z, y, x)` 行优先.

use std::borrow::Cow;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use itertools::Itertools;
use ndarray::Array3;

use super::{LabelVolume, VolumeAttr, VolumeGeometry};
use crate::atomic::write_atomically;
use crate::error::{ReadError, WriteError};
use crate::LabelCode;

/// 体素元素类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ElementType {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "MET_CHAR" => Self::Char,
            "MET_UCHAR" => Self::UChar,
            "MET_SHORT" => Self::Short,
            "MET_USHORT" => Self::UShort,
            "MET_INT" | "MET_LONG" => Self::Int,
            "MET_UINT" | "MET_ULONG" => Self::UInt,
            "MET_FLOAT" => Self::Float,
            "MET_DOUBLE" => Self::Double,
            _ => return None,
        })
    }

    /// 单个元素的字节数.
    #[inline]
    const fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// 解码单个元素. `buf` 的长度必须等于 `self.size()`.
    fn decode(self, buf: &[u8], msb: bool) -> f64 {
        macro_rules! num {
            ($t: ty, $n: expr) => {{
                let mut b = [0u8; $n];
                b.copy_from_slice(buf);
                if msb {
                    <$t>::from_be_bytes(b) as f64
                } else {
                    <$t>::from_le_bytes(b) as f64
                }
            }};
        }
        match self {
            Self::Char => buf[0] as i8 as f64,
            Self::UChar => buf[0] as f64,
            Self::Short => num!(i16, 2),
            Self::UShort => num!(u16, 2),
            Self::Int => num!(i32, 4),
            Self::UInt => num!(u32, 4),
            Self::Float => num!(f32, 4),
            Self::Double => num!(f64, 8),
        }
    }
}

/// 数据文件位置.
#[derive(Debug, Clone, PartialEq)]
enum DataFile {
    /// 数据紧随文件头.
    Local,

    /// 独立的数据文件 (相对于头文件所在目录).
    External(PathBuf),
}

/// 解析后的 MetaImage 文件头.
#[derive(Debug, Clone)]
struct MetaHeader {
    dim_size: [usize; 3],
    len: usize,
    byte_len: usize,
    spacing: [f64; 3],
    offset: [f64; 3],
    element_type: ElementType,
    msb: bool,
    compressed: bool,
    header_size: i64,
    data_file: DataFile,
}

impl MetaHeader {
    /// 解析 `bytes` 开头的文件头. 返回文件头和数据起始偏移.
    fn parse(path: &Path, bytes: &[u8]) -> Result<(Self, usize), ReadError> {
        let invalid = |msg: String| ReadError::invalid(path, msg);

        let mut ndims = None;
        let mut dim_size = None;
        let mut spacing = [1.0; 3];
        let mut offset = [0.0; 3];
        let mut element_type = None;
        let mut msb = false;
        let mut compressed = false;
        let mut binary = true;
        let mut channels = 1usize;
        let mut header_size = 0i64;
        let mut data_file = None;

        let mut cursor = 0usize;
        while cursor < bytes.len() && data_file.is_none() {
            let end = bytes[cursor..]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(bytes.len(), |p| cursor + p);
            let line = String::from_utf8_lossy(&bytes[cursor..end]);
            cursor = (end + 1).min(bytes.len());

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(invalid(format!("malformed header line `{line}`")));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "NDims" => ndims = Some(parse_num::<usize>(path, key, value)?),
                "DimSize" => dim_size = Some(parse_triple::<usize>(path, key, value)?),
                "ElementSpacing" | "ElementSize" => spacing = parse_triple(path, key, value)?,
                "Offset" | "Origin" | "Position" => offset = parse_triple(path, key, value)?,
                "ElementType" => {
                    element_type = Some(
                        ElementType::parse(value)
                            .ok_or_else(|| invalid(format!("unsupported ElementType `{value}`")))?,
                    )
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => msb = parse_bool(value),
                "CompressedData" => compressed = parse_bool(value),
                "BinaryData" => binary = parse_bool(value),
                "ElementNumberOfChannels" => channels = parse_num(path, key, value)?,
                "HeaderSize" => header_size = parse_num(path, key, value)?,
                "ObjectType" if !value.eq_ignore_ascii_case("Image") => {
                    return Err(invalid(format!("unsupported ObjectType `{value}`")));
                }
                "ElementDataFile" => {
                    data_file = Some(if value.eq_ignore_ascii_case("LOCAL") {
                        DataFile::Local
                    } else if value.contains('%') || value.eq_ignore_ascii_case("LIST") {
                        return Err(invalid(format!("multi-file data `{value}` is not supported")));
                    } else {
                        DataFile::External(PathBuf::from(value))
                    });
                }
                _ => {}
            }
        }

        let data_file = data_file.ok_or_else(|| invalid("missing ElementDataFile".into()))?;
        if ndims != Some(3) {
            return Err(invalid(format!("expected NDims = 3, got {ndims:?}")));
        }
        if !binary {
            return Err(invalid("ASCII element data is not supported".into()));
        }
        if channels != 1 {
            return Err(invalid(format!("expected 1 channel, got {channels}")));
        }

        let dim_size = dim_size.ok_or_else(|| invalid("missing DimSize".into()))?;
        let element_type = element_type.ok_or_else(|| invalid("missing ElementType".into()))?;
        let len = dim_size
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| invalid(format!("DimSize {dim_size:?} is too large")))?;
        let byte_len = len
            .checked_mul(element_type.size())
            .ok_or_else(|| invalid(format!("DimSize {dim_size:?} is too large")))?;

        let header = Self {
            dim_size,
            len,
            byte_len,
            spacing,
            offset,
            element_type,
            msb,
            compressed,
            header_size,
            data_file,
        };
        Ok((header, cursor))
    }

}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_num<T: std::str::FromStr>(path: &Path, key: &str, value: &str) -> Result<T, ReadError> {
    value
        .parse()
        .map_err(|_| ReadError::invalid(path, format!("cannot parse {key} = `{value}`")))
}

fn parse_triple<T: std::str::FromStr + Copy>(
    path: &Path,
    key: &str,
    value: &str,
) -> Result<[T; 3], ReadError> {
    let parts: Vec<T> = value
        .split_whitespace()
        .map(|v| parse_num(path, key, v))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(ReadError::invalid(
            path,
            format!("{key} needs 3 values, got `{value}`"),
        )),
    }
}

/// 读取 MetaImage 体素标签图.
pub(super) fn read(path: &Path) -> Result<LabelVolume, ReadError> {
    let bytes = fs::read(path).map_err(|e| ReadError::io(path, e))?;
    let (header, data_start) = MetaHeader::parse(path, &bytes)?;

    let raw: Cow<[u8]> = match &header.data_file {
        DataFile::Local => Cow::Borrowed(&bytes[data_start..]),
        DataFile::External(name) => {
            let data_path = path.parent().map_or_else(|| name.clone(), |p| p.join(name));
            let all = fs::read(&data_path).map_err(|e| ReadError::io(&data_path, e))?;
            let skip = match header.header_size {
                // -1: 数据位于文件末尾.
                -1 if !header.compressed => all.len().saturating_sub(header.byte_len),
                n if n > 0 => n as usize,
                _ => 0,
            };
            Cow::Owned(all.get(skip..).unwrap_or_default().to_vec())
        }
    };

    let raw = if header.compressed {
        // 预留空间不超过压缩数据长度的 4 倍, 其余按实际解压结果增长.
        let mut out = Vec::with_capacity(header.byte_len.min(raw.len().saturating_mul(4)));
        ZlibDecoder::new(raw.as_ref())
            .take(header.byte_len as u64)
            .read_to_end(&mut out)
            .map_err(|e| ReadError::invalid(path, format!("corrupt compressed data: {e}")))?;
        Cow::Owned(out)
    } else {
        raw
    };

    if raw.len() < header.byte_len {
        return Err(ReadError::invalid(
            path,
            format!(
                "truncated element data: expected {} bytes, got {}",
                header.byte_len,
                raw.len()
            ),
        ));
    }

    let ty = header.element_type;
    let mut values = Vec::with_capacity(header.len);
    for chunk in raw[..header.byte_len].chunks_exact(ty.size()) {
        let v = ty.decode(chunk, header.msb);
        if v.fract() != 0.0 || v < LabelCode::MIN as f64 || v > LabelCode::MAX as f64 {
            return Err(ReadError::invalid(
                path,
                format!("voxel value {v} is not a valid integer label"),
            ));
        }
        values.push(v as LabelCode);
    }

    let [x, y, z] = header.dim_size;
    let data = Array3::from_shape_vec((z, y, x), values)
        .map_err(|e| ReadError::invalid(path, e.to_string()))?;
    let geometry = VolumeGeometry::new(header.spacing, header.offset);
    Ok(LabelVolume::new(data, geometry))
}

/// 将体素标签图写为单文件 MetaImage (`.mha`, `MET_SHORT`).
///
/// `compressed` 为 `true` 时数据部分以 zlib 压缩. 写出是 "全有或全无" 的.
pub fn write_meta_image<P: AsRef<Path>>(
    volume: &LabelVolume,
    path: P,
    compressed: bool,
) -> Result<(), WriteError> {
    let (z, y, x) = volume.shape();
    let mut payload = Vec::with_capacity(volume.size() * 2);
    for v in volume.data().iter() {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    if compressed {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&payload).map_err(|source| WriteError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        payload = enc.finish().map_err(|source| WriteError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
    }

    let g = volume.geometry();
    let triple = |t: &[f64; 3]| t.iter().join(" ");
    let mut header = vec![
        "ObjectType = Image".to_string(),
        "NDims = 3".to_string(),
        "BinaryData = True".to_string(),
        "BinaryDataByteOrderMSB = False".to_string(),
        format!("CompressedData = {}", if compressed { "True" } else { "False" }),
    ];
    if compressed {
        header.push(format!("CompressedDataSize = {}", payload.len()));
    }
    header.extend([
        "TransformMatrix = 1 0 0 0 1 0 0 0 1".to_string(),
        format!("Offset = {}", triple(&g.origin)),
        "CenterOfRotation = 0 0 0".to_string(),
        "AnatomicalOrientation = RAI".to_string(),
        format!("ElementSpacing = {}", triple(&g.spacing)),
        format!("DimSize = {x} {y} {z}"),
        "ElementType = MET_SHORT".to_string(),
        "ElementDataFile = LOCAL".to_string(),
    ]);

    write_atomically(path.as_ref(), |w| {
        for line in &header {
            writeln!(w, "{line}")?;
        }
        w.write_all(&payload)
    })
}
