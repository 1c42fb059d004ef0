use std::fs;
use std::io::Write;
use std::path::Path;

use super::Mesh;
use crate::atomic::write_atomically;
use crate::error::{ReadError, WriteError};

/// STL 文件格式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StlFormat {
    /// 二进制 STL, 小端序.
    #[default]
    Binary,

    /// 文本 STL.
    Ascii,
}

const HEADER_LEN: usize = 80;
const RECORD_LEN: usize = 50;

/// 二进制文件头. 不能以 `solid` 开头, 否则部分读取器会误判为文本格式.
fn binary_header(name: &str) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    let text = format!("label-berry mesh: {name}");
    let n = text.len().min(HEADER_LEN);
    header[..n].copy_from_slice(&text.as_bytes()[..n]);
    header
}

/// 将 `mesh` 写为 STL 文件. 法向由三角形顶点按右手法则重新计算.
///
/// 写出是 "全有或全无" 的: 先写入同目录的临时文件, 成功后原子重命名为 `path`.
/// 失败时不会留下任何部分文件. 父目录不存在时会被创建.
pub fn write_stl<P: AsRef<Path>>(
    mesh: &Mesh,
    path: P,
    name: &str,
    format: StlFormat,
) -> Result<(), WriteError> {
    let path = path.as_ref();
    let count = u32::try_from(mesh.triangle_count()).map_err(|_| WriteError::TooManyTriangles {
        path: path.to_path_buf(),
        count: mesh.triangle_count(),
    })?;

    let facets = (0..mesh.triangle_count()).map(|i| {
        let n = mesh.triangle_normal(i).map(|v| v as f32);
        let corners = mesh.corners(i).map(|p| p.map(|v| v as f32));
        (n, corners)
    });

    match format {
        StlFormat::Binary => write_atomically(path, |w| {
            w.write_all(&binary_header(name))?;
            w.write_all(&count.to_le_bytes())?;
            for (n, corners) in facets {
                for v in std::iter::once(n).chain(corners) {
                    for c in v {
                        w.write_all(&c.to_le_bytes())?;
                    }
                }
                w.write_all(&0u16.to_le_bytes())?;
            }
            Ok(())
        }),
        StlFormat::Ascii => write_atomically(path, |w| {
            writeln!(w, "solid {name}")?;
            for (n, corners) in facets {
                writeln!(w, "  facet normal {} {} {}", n[0], n[1], n[2])?;
                writeln!(w, "    outer loop")?;
                for p in corners {
                    writeln!(w, "      vertex {} {} {}", p[0], p[1], p[2])?;
                }
                writeln!(w, "    endloop")?;
                writeln!(w, "  endfacet")?;
            }
            writeln!(w, "endsolid {name}")
        }),
    }
}

/// 读取二进制或文本 STL 文件.
///
/// 返回的是三角形汤 (每个三角形 3 个独立顶点); 如需共享顶点, 使用 [`Mesh::weld`].
pub fn read_stl<P: AsRef<Path>>(path: P) -> Result<Mesh, ReadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ReadError::io(path, e))?;

    let binary_len = (bytes.len() >= HEADER_LEN + 4).then(|| {
        let mut n = [0u8; 4];
        n.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + 4]);
        HEADER_LEN + 4 + u32::from_le_bytes(n) as usize * RECORD_LEN
    });
    let looks_ascii = bytes.starts_with(b"solid")
        && !bytes[..bytes.len().min(HEADER_LEN)].contains(&0)
        && binary_len != Some(bytes.len());

    let mut vertices = Vec::new();
    if looks_ascii {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| ReadError::invalid(path, "ASCII STL is not valid UTF-8"))?;
        let mut tokens = text.split_whitespace();
        while let Some(tok) = tokens.next() {
            if tok != "vertex" {
                continue;
            }
            let mut p = [0.0f64; 3];
            for c in p.iter_mut() {
                *c = tokens
                    .next()
                    .and_then(|t| t.parse::<f32>().ok())
                    .ok_or_else(|| ReadError::invalid(path, "malformed vertex line"))?
                    as f64;
            }
            vertices.push(p);
        }
        if vertices.len() % 3 != 0 {
            return Err(ReadError::invalid(
                path,
                format!("{} vertices do not form whole triangles", vertices.len()),
            ));
        }
    } else {
        let expected = binary_len.ok_or_else(|| ReadError::invalid(path, "file too short"))?;
        if bytes.len() < expected {
            return Err(ReadError::invalid(
                path,
                format!("truncated binary STL: expected {expected} bytes, got {}", bytes.len()),
            ));
        }
        for record in bytes[HEADER_LEN + 4..expected].chunks_exact(RECORD_LEN) {
            // 跳过 12 字节法向.
            for corner in record[12..48].chunks_exact(12) {
                let mut p = [0.0f64; 3];
                for (c, raw) in p.iter_mut().zip(corner.chunks_exact(4)) {
                    let mut b = [0u8; 4];
                    b.copy_from_slice(raw);
                    *c = f32::from_le_bytes(b) as f64;
                }
                vertices.push(p);
            }
        }
    }

    let triangles = (0..vertices.len() as u32 / 3)
        .map(|i| [3 * i, 3 * i + 1, 3 * i + 2])
        .collect();
    Ok(Mesh::new(vertices, triangles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::tetrahedron;
    use approx::assert_relative_eq;

    fn assert_same_soup(a: &Mesh, soup: &Mesh) {
        assert_eq!(a.triangle_count(), soup.triangle_count());
        for i in 0..a.triangle_count() {
            for (p, q) in a.corners(i).iter().zip(soup.corners(i)) {
                for k in 0..3 {
                    assert_relative_eq!(p[k], q[k], epsilon = 1e-6);
                }
            }
        }
    }

    fn shifted_tetrahedron() -> Mesh {
        let m = tetrahedron();
        let vertices = m
            .vertices()
            .iter()
            .map(|p| [p[0] * 0.3 - 12.7, p[1] * 1.1 + 100.05, p[2] + 0.001])
            .collect();
        Mesh::new(vertices, m.triangles().to_vec())
    }

    #[test]
    fn test_binary_roundtrip_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("out").join("fat.stl");
        let m = shifted_tetrahedron();
        write_stl(&m, &p, "fat", StlFormat::Binary).unwrap();

        let bytes = fs::read(&p).unwrap();
        assert_eq!(bytes.len(), 84 + 50 * 4);
        assert!(!bytes.starts_with(b"solid"));
        assert_eq!(&bytes[80..84], &4u32.to_le_bytes());
        // 第一个三角形 (0, 2, 1) 的法向为 -z.
        assert_eq!(&bytes[92..96], &(-1.0f32).to_le_bytes());

        let back = read_stl(&p).unwrap();
        assert_same_soup(&m, &back);
        assert!(back.weld(1e-5).is_watertight());
    }

    #[test]
    fn test_ascii_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("skin.stl");
        let m = shifted_tetrahedron();
        write_stl(&m, &p, "skin", StlFormat::Ascii).unwrap();

        let text = fs::read_to_string(&p).unwrap();
        assert!(text.starts_with("solid skin\n"));
        assert!(text.trim_end().ends_with("endsolid skin"));
        assert_eq!(text.matches("facet normal").count(), 4);

        let back = read_stl(&p).unwrap();
        assert_same_soup(&m, &back);
    }

    #[test]
    fn test_empty_mesh() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty.stl");
        write_stl(&Mesh::empty(), &p, "empty", StlFormat::Binary).unwrap();
        assert_eq!(fs::metadata(&p).unwrap().len(), 84);
        assert!(read_stl(&p).unwrap().is_empty());
    }

    #[test]
    fn test_binary_header_starting_with_solid() {
        // 部分导出工具的二进制文件头以 "solid" 开头, 以长度判别.
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("odd.stl");
        let mut bytes = vec![b' '; 80];
        bytes[..5].copy_from_slice(b"solid");
        bytes.extend_from_slice(&1u32.to_le_bytes());
        for v in [0.0f32, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[0, 0]);
        fs::write(&p, bytes).unwrap();

        let m = read_stl(&p).unwrap();
        assert_eq!(m.triangle_count(), 1);
        assert_eq!(m.corners(0)[2], [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_invalid_files() {
        let dir = tempfile::tempdir().unwrap();

        let short = dir.path().join("short.stl");
        fs::write(&short, b"abc").unwrap();
        assert!(matches!(read_stl(&short), Err(ReadError::InvalidContent { .. })));

        let truncated = dir.path().join("truncated.stl");
        let mut bytes = vec![0u8; 80];
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 60]);
        fs::write(&truncated, bytes).unwrap();
        assert!(matches!(read_stl(&truncated), Err(ReadError::InvalidContent { .. })));

        let bad = dir.path().join("bad.stl");
        fs::write(&bad, "solid x\n facet normal 0 0 1\n outer loop\n vertex 1 nope 2\n").unwrap();
        assert!(matches!(read_stl(&bad), Err(ReadError::InvalidContent { .. })));

        assert!(matches!(
            read_stl(dir.path().join("missing.stl")),
            Err(ReadError::NotFound { .. })
        ));
    }

    #[test]
    fn test_unwritable_target_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        // 父路径是一个普通文件, 目录无法创建.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let target = blocker.join("fat.stl");
        let err = write_stl(&tetrahedron(), &target, "fat", StlFormat::Binary);
        assert!(matches!(err, Err(WriteError::Io { .. })));
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
