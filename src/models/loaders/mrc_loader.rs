//! MRC 文件读取
//!
//! 只读取第一个 section，支持 mode 0 (int8)、1 (int16)、2 (float32)、6 (uint16)。
//! 字节序由 header 中的 machine stamp 决定。

use crate::error::ProcessingError;
use crate::models::micrograph::Micrograph;
use std::path::Path;

/// 固定 header 长度
pub const HEADER_LEN: usize = 1024;

const NSYMBT_OFFSET: usize = 92;
const MAP_OFFSET: usize = 208;
const MACHST_OFFSET: usize = 212;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Int8,
    Int16,
    Float32,
    Uint16,
}

impl Mode {
    fn from_code(code: i32) -> Result<Self, String> {
        match code {
            0 => Ok(Mode::Int8),
            1 => Ok(Mode::Int16),
            2 => Ok(Mode::Float32),
            6 => Ok(Mode::Uint16),
            other => Err(format!("不支持的 mode: {}", other)),
        }
    }

    fn bytes_per_value(self) -> usize {
        match self {
            Mode::Int8 => 1,
            Mode::Int16 | Mode::Uint16 => 2,
            Mode::Float32 => 4,
        }
    }
}

/// 读取 MRC 文件，返回第一个 section 的强度网格
pub fn read_mrc(path: &Path) -> Result<Micrograph, ProcessingError> {
    let bytes = std::fs::read(path).map_err(|source| ProcessingError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_mrc(&bytes).map_err(|reason| ProcessingError::Format {
        path: path.to_path_buf(),
        reason,
    })
}

/// 从内存中的 MRC 字节解码
pub fn decode_mrc(bytes: &[u8]) -> Result<Micrograph, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("文件长度 {} 小于 header 长度 {}", bytes.len(), HEADER_LEN));
    }

    let order = if bytes[MACHST_OFFSET] == 0x11 {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
    let word = |offset: usize| read_i32(&bytes[offset..offset + 4], order);

    let nx = word(0);
    let ny = word(4);
    let nz = word(8);
    let mode = Mode::from_code(word(12))?;
    let nsymbt = word(NSYMBT_OFFSET);

    if nx <= 0 || ny <= 0 || nz <= 0 {
        return Err(format!("非法尺寸 nx={} ny={} nz={}", nx, ny, nz));
    }
    if nsymbt < 0 {
        return Err(format!("非法扩展 header 长度: {}", nsymbt));
    }

    let (width, height) = (nx as usize, ny as usize);
    let value_size = mode.bytes_per_value();
    let start = HEADER_LEN + nsymbt as usize;
    let end = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(value_size))
        .and_then(|n| n.checked_add(start))
        .ok_or_else(|| format!("数据尺寸溢出 nx={} ny={}", nx, ny))?;
    if bytes.len() < end {
        return Err(format!("数据不完整: 需要 {} 字节，实际 {} 字节", end, bytes.len()));
    }

    let pixels = bytes[start..end]
        .chunks_exact(value_size)
        .map(|chunk| decode_value(chunk, mode, order))
        .collect();

    Micrograph::new(width, height, pixels).ok_or_else(|| "像素数量与尺寸不匹配".to_string())
}

/// 把 micrograph 编码为 mode 2 (float32, 小端) 的 MRC 字节
///
/// 宽或高超出 i32 时返回错误。
pub fn encode_mrc(micrograph: &Micrograph) -> Result<Vec<u8>, String> {
    let nx = i32::try_from(micrograph.width())
        .map_err(|_| format!("宽度超出 MRC 头部范围: {}", micrograph.width()))?;
    let ny = i32::try_from(micrograph.height())
        .map_err(|_| format!("高度超出 MRC 头部范围: {}", micrograph.height()))?;

    let mut bytes = vec![0u8; HEADER_LEN];
    let put = |bytes: &mut [u8], offset: usize, value: i32| {
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    };
    put(&mut bytes[..], 0, nx);
    put(&mut bytes[..], 4, ny);
    put(&mut bytes[..], 8, 1);
    put(&mut bytes[..], 12, 2);
    bytes[MAP_OFFSET..MAP_OFFSET + 4].copy_from_slice(b"MAP ");
    bytes[MACHST_OFFSET..MACHST_OFFSET + 2].copy_from_slice(&[0x44, 0x44]);

    bytes.reserve(micrograph.pixels().len() * 4);
    for &v in micrograph.pixels() {
        bytes.extend_from_slice(&(v as f32).to_le_bytes());
    }
    Ok(bytes)
}

fn read_i32(b: &[u8], order: ByteOrder) -> i32 {
    let raw = [b[0], b[1], b[2], b[3]];
    match order {
        ByteOrder::Little => i32::from_le_bytes(raw),
        ByteOrder::Big => i32::from_be_bytes(raw),
    }
}

fn decode_value(b: &[u8], mode: Mode, order: ByteOrder) -> f64 {
    match (mode, order) {
        (Mode::Int8, _) => f64::from(b[0] as i8),
        (Mode::Int16, ByteOrder::Little) => f64::from(i16::from_le_bytes([b[0], b[1]])),
        (Mode::Int16, ByteOrder::Big) => f64::from(i16::from_be_bytes([b[0], b[1]])),
        (Mode::Uint16, ByteOrder::Little) => f64::from(u16::from_le_bytes([b[0], b[1]])),
        (Mode::Uint16, ByteOrder::Big) => f64::from(u16::from_be_bytes([b[0], b[1]])),
        (Mode::Float32, ByteOrder::Little) => {
            f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        }
        (Mode::Float32, ByteOrder::Big) => f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(nx: i32, ny: i32, mode: i32, big_endian: bool) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_LEN];
        for (offset, value) in [(0, nx), (4, ny), (8, 1), (12, mode)] {
            let raw = if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            bytes[offset..offset + 4].copy_from_slice(&raw);
        }
        bytes[MACHST_OFFSET] = if big_endian { 0x11 } else { 0x44 };
        bytes
    }

    #[test]
    fn test_float32_written_file_reads_back() {
        let img = Micrograph::new(3, 2, vec![0.5, -1.0, 2.0, 3.25, 0.0, 7.0]).unwrap();
        let decoded = decode_mrc(&encode_mrc(&img).unwrap()).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_encode_rejects_width_beyond_header_range() {
        // 高为 0，像素为空，只有宽度越界
        let img = Micrograph::new(i32::MAX as usize + 1, 0, Vec::new()).unwrap();
        let err = encode_mrc(&img).unwrap_err();
        assert!(err.contains("宽度"));
    }

    #[test]
    fn test_decodes_big_endian_int16() {
        let mut bytes = header(2, 1, 1, true);
        bytes.extend_from_slice(&(-300i16).to_be_bytes());
        bytes.extend_from_slice(&(12i16).to_be_bytes());

        let img = decode_mrc(&bytes).unwrap();
        assert_eq!(img.pixels(), &[-300.0, 12.0]);
    }

    #[test]
    fn test_skips_extended_header() {
        let mut bytes = header(1, 1, 0, false);
        bytes[NSYMBT_OFFSET..NSYMBT_OFFSET + 4].copy_from_slice(&8i32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF; 8]);
        bytes.push(0xFE); // int8 -2

        let img = decode_mrc(&bytes).unwrap();
        assert_eq!(img.pixels(), &[-2.0]);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let mut bytes = header(1, 1, 4, false);
        bytes.extend_from_slice(&[0; 8]);
        let err = decode_mrc(&bytes).unwrap_err();
        assert!(err.contains("mode"));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut bytes = header(4, 4, 2, false);
        bytes.extend_from_slice(&[0; 10]);
        assert!(decode_mrc(&bytes).is_err());
        assert!(decode_mrc(&bytes[..100]).is_err());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_mrc(&dir.path().join("missing.mrc")).unwrap_err();
        assert!(matches!(err, ProcessingError::Read { .. }));
    }
}
