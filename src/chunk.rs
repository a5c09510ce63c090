// src/chunk.rs
//
// Chunk planning and bounded per-chunk readers for multipart uploads.
//
// Design:
// - plan_chunks() partitions a file length into gapless, 1-based chunks. The plan
//   is never persisted: resume recomputes it, so it must stay deterministic.
// - open_chunk() gives each chunk its own file handle (no shared cursor) and a
//   reader capped at chunk.size bytes, even if the file has grown since planning.

use bytes::{Bytes, BytesMut};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};

use crate::error::UploadError;

/// One contiguous byte range of the source file, uploaded as one part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// 1-based, equal to the storage part number.
    pub index: i32,
    pub offset: u64,
    pub size: u64,
    pub source: PathBuf,
}

impl Chunk {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Reader over exactly one chunk's bytes.
pub type ChunkReader = Take<File>;

/// Split `file_size` bytes into `ceil(file_size / chunk_size)` chunks.
///
/// An empty file yields an empty plan; rejecting empty sources is the
/// uploader's job.
pub fn plan_chunks(source: &Path, file_size: u64, chunk_size: u64) -> Result<Vec<Chunk>, UploadError> {
    let count = part_count(file_size, chunk_size)?;

    let mut chunks = Vec::with_capacity(count);
    let mut offset = 0u64;
    let mut index = 1i32;
    while offset < file_size {
        let size = chunk_size.min(file_size - offset);
        chunks.push(Chunk {
            index,
            offset,
            size,
            source: source.to_path_buf(),
        });
        offset += size;
        index += 1;
    }
    Ok(chunks)
}

/// Number of chunks `plan_chunks` would produce, without building them.
pub fn part_count(file_size: u64, chunk_size: u64) -> Result<usize, UploadError> {
    if chunk_size == 0 {
        return Err(UploadError::InvalidInput("chunk size must be greater than zero".to_string()));
    }
    let count = file_size.div_ceil(chunk_size);
    if count > i32::MAX as u64 {
        return Err(UploadError::InvalidInput(format!(
            "{file_size} bytes in {chunk_size}-byte chunks exceeds the part number space"
        )));
    }
    Ok(count as usize)
}

/// Open an independent handle positioned at `chunk.offset`, limited to `chunk.size` bytes.
pub async fn open_chunk(chunk: &Chunk) -> Result<ChunkReader, UploadError> {
    let mut file = File::open(&chunk.source)
        .await
        .map_err(|e| UploadError::source_unavailable(&chunk.source, e))?;

    let len = file
        .metadata()
        .await
        .map_err(|e| UploadError::source_unavailable(&chunk.source, e))?
        .len();
    if len < chunk.end() {
        return Err(UploadError::source_unavailable(
            &chunk.source,
            format!("file is {len} bytes, part {} needs bytes up to {}", chunk.index, chunk.end()),
        ));
    }

    file.seek(SeekFrom::Start(chunk.offset))
        .await
        .map_err(|e| UploadError::source_unavailable(&chunk.source, e))?;

    Ok(file.take(chunk.size))
}

/// Read a whole chunk into memory through [`open_chunk`].
pub async fn read_chunk(chunk: &Chunk) -> Result<Bytes, UploadError> {
    let mut reader = open_chunk(chunk).await?;
    let mut buf = BytesMut::with_capacity(chunk.size as usize);
    while (buf.len() as u64) < chunk.size {
        let n = reader
            .read_buf(&mut buf)
            .await
            .map_err(|e| UploadError::source_unavailable(&chunk.source, e))?;
        if n == 0 {
            break;
        }
    }
    if buf.len() as u64 != chunk.size {
        return Err(UploadError::source_unavailable(
            &chunk.source,
            format!("short read for part {}: {} of {} bytes", chunk.index, buf.len(), chunk.size),
        ));
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_file(len: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        f.write_all(&data).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn plan_is_gapless_and_sums_to_file_size() {
        let src = Path::new("/tmp/whatever.bin");
        for file_size in [0u64, 1, 4, 5, 6, 99, 100, 101, 1024] {
            for chunk_size in [1u64, 3, 5, 100, 4096] {
                let plan = plan_chunks(src, file_size, chunk_size).unwrap();
                assert_eq!(plan.len() as u64, file_size.div_ceil(chunk_size));
                assert_eq!(plan.iter().map(|c| c.size).sum::<u64>(), file_size);

                let mut expected_offset = 0;
                for (i, c) in plan.iter().enumerate() {
                    assert_eq!(c.index, i as i32 + 1);
                    assert_eq!(c.offset, expected_offset);
                    assert!(c.size > 0 && c.size <= chunk_size);
                    expected_offset = c.end();
                }
            }
        }
    }

    #[test]
    fn twelve_mib_in_five_mib_chunks() {
        const MIB: u64 = 1024 * 1024;
        let plan = plan_chunks(Path::new("big.bin"), 12 * MIB, 5 * MIB).unwrap();
        let sizes: Vec<u64> = plan.iter().map(|c| c.size).collect();
        assert_eq!(sizes, vec![5 * MIB, 5 * MIB, 2 * MIB]);
    }

    #[test]
    fn plan_is_deterministic() {
        let a = plan_chunks(Path::new("x"), 12345, 1000).unwrap();
        let b = plan_chunks(Path::new("x"), 12345, 1000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn part_count_matches_plan_without_building_it() {
        assert_eq!(part_count(0, 5).unwrap(), 0);
        assert_eq!(part_count(12, 5).unwrap(), 3);
        assert_eq!(part_count(1 << 40, 1 << 20).unwrap(), 1 << 20);
        assert!(matches!(part_count(u64::MAX, 1), Err(UploadError::InvalidInput(_))));
        assert!(matches!(part_count(10, 0), Err(UploadError::InvalidInput(_))));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = plan_chunks(Path::new("x"), 10, 0).unwrap_err();
        assert!(matches!(err, UploadError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn reader_is_bounded_to_its_chunk() {
        let f = sample_file(100);
        let plan = plan_chunks(f.path(), 100, 30).unwrap();
        assert_eq!(plan.len(), 4);

        let mut joined = Vec::new();
        for c in &plan {
            let bytes = read_chunk(c).await.unwrap();
            assert_eq!(bytes.len() as u64, c.size);
            joined.extend_from_slice(&bytes);
        }
        assert_eq!(joined, std::fs::read(f.path()).unwrap());
    }

    #[tokio::test]
    async fn reader_ignores_growth_past_the_plan() {
        let mut f = sample_file(50);
        let plan = plan_chunks(f.path(), 50, 20).unwrap();
        f.write_all(&[0xFF; 64]).unwrap();
        f.flush().unwrap();

        let mut reader = open_chunk(&plan[2]).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 10);
        assert!(out.iter().all(|b| *b != 0xFF));
    }

    #[tokio::test]
    async fn truncated_source_is_unavailable() {
        let f = sample_file(50);
        let plan = plan_chunks(f.path(), 50, 20).unwrap();
        f.as_file().set_len(30).unwrap();

        assert!(open_chunk(&plan[0]).await.is_ok());
        let err = open_chunk(&plan[1]).await.unwrap_err();
        assert!(matches!(err, UploadError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_source_is_unavailable() {
        let chunk = Chunk {
            index: 1,
            offset: 0,
            size: 1,
            source: PathBuf::from("/definitely/not/here.bin"),
        };
        let err = open_chunk(&chunk).await.unwrap_err();
        assert!(matches!(err, UploadError::SourceUnavailable { .. }));
    }
}
