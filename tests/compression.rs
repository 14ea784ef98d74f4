#[cfg(any(feature = "compression-gzip", feature = "compression-zstd"))]
mod compression_tests {
    use anyhow::Result;
    use linesieve::io::cloud::helpers::RetryConfig;
    use linesieve::io::cloud::{CloudResult, ErrorKind, FakeObjectIO, ListPage, ObjectIO};
    use linesieve::io::compression::CodecSet;
    use linesieve::matcher::{MatchMode, Matcher};
    use linesieve::output::VecSink;
    use linesieve::runner::{RunContext, Runner};
    use linesieve::selection::SelectionPolicy;
    use std::io::{self, Cursor, Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_jsonl() -> Vec<u8> {
        (0..50)
            .map(|i| {
                let topic = if i % 5 == 0 { "ももクロ" } else { "天気" };
                format!("{}\n", serde_json::json!({ "id": i, "content": format!("記事 {i} は {topic} について") }))
            })
            .collect::<String>()
            .into_bytes()
    }

    fn scan(store: &FakeObjectIO, chunk: u64) -> Result<(VecSink, linesieve::RunSummary)> {
        let matcher = Matcher::new(1, 1000, &["ももクロ"], MatchMode::Literal)?;
        let runner = Runner::new(store, "bucket", matcher, SelectionPolicy::Exhaustive)
            .with_chunk_size(chunk);
        let mut sink = VecSink::new();
        let mut ctx = RunContext::new(42).with_retry(RetryConfig::immediate(3));
        let summary = runner.run(&mut ctx, &mut sink)?;
        Ok((sink, summary))
    }

    #[cfg(feature = "compression-gzip")]
    fn gzip(data: &[u8]) -> Result<Vec<u8>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_gzip_partition_matches_plain() -> Result<()> {
        let data = sample_jsonl();
        let plain = FakeObjectIO::new();
        plain.put_object("bucket", "part.jsonl", &data)?;
        let packed = FakeObjectIO::new();
        packed.put_object("bucket", "part.jsonl.gz", &gzip(&data)?)?;

        let (expected, _) = scan(&plain, 64)?;
        let (got, summary) = scan(&packed, 64)?;
        assert_eq!(got.rows, expected.rows);
        assert_eq!(got.rows.len(), 10);
        assert_eq!(summary.partitions_completed, 1);

        // Compressed partitions are streamed through one open, never ranged.
        let calls = packed.calls();
        assert_eq!(calls.open_object, 1);
        assert_eq!(calls.get_object, 0);
        assert_eq!(calls.get_range, 0);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_concatenated_gzip_members_decode_fully() -> Result<()> {
        let data = sample_jsonl();
        let (head, tail) = data.split_at(data.len() / 2);
        let mut joined = gzip(head)?;
        joined.extend(gzip(tail)?);

        let store = FakeObjectIO::new();
        store.put_object("bucket", "joined.jsonl.GZ", &joined)?;
        let (sink, summary) = scan(&store, 1024)?;
        assert_eq!(sink.rows.len(), 10);
        assert_eq!(summary.lines_scanned, 50);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_corrupt_stream_skips_partition() -> Result<()> {
        let store = FakeObjectIO::new();
        store.put_object("bucket", "bad.jsonl.gz", b"definitely not gzip")?;
        store.put_object("bucket", "good.jsonl", &sample_jsonl())?;

        let (sink, summary) = scan(&store, 256)?;
        assert_eq!(sink.rows.len(), 10);
        assert_eq!(summary.partitions_skipped_permanent, 1);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_compressed_fetch_is_retried() -> Result<()> {
        let store = FakeObjectIO::new();
        store.put_object("bucket", "part.jsonl.gz", &gzip(&sample_jsonl())?)?;
        store.fail_next("part.jsonl.gz", ErrorKind::Network, 1);

        let (sink, summary) = scan(&store, 128)?;
        assert_eq!(sink.rows.len(), 10);
        assert_eq!(summary.retries, 1);
        Ok(())
    }

    /// Reader that fails with a transport error once its bytes run out.
    struct DropsConnection(Cursor<Vec<u8>>);

    impl Read for DropsConnection {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 if !buf.is_empty() => Err(io::Error::from(io::ErrorKind::ConnectionReset)),
                n => Ok(n),
            }
        }
    }

    /// Store whose first stream of every object is cut off after `cut` bytes.
    struct CutsFirstStream {
        inner: FakeObjectIO,
        cut: usize,
        opens: AtomicUsize,
    }

    impl ObjectIO for CutsFirstStream {
        fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> CloudResult<()> {
            self.inner.put_object(bucket, key, data)
        }

        fn get_object(&self, bucket: &str, key: &str) -> CloudResult<Vec<u8>> {
            self.inner.get_object(bucket, key)
        }

        fn open_object(&self, bucket: &str, key: &str) -> CloudResult<Box<dyn Read + Send>> {
            let mut data = self.inner.get_object(bucket, key)?;
            if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
                data.truncate(self.cut);
                return Ok(Box::new(DropsConnection(Cursor::new(data))));
            }
            Ok(Box::new(Cursor::new(data)))
        }

        fn get_range(&self, bucket: &str, key: &str, start: u64, end: u64) -> CloudResult<Vec<u8>> {
            self.inner.get_range(bucket, key, start, end)
        }

        fn list_page(
            &self,
            bucket: &str,
            prefix: Option<&str>,
            token: Option<&str>,
            page_size: usize,
        ) -> CloudResult<ListPage> {
            self.inner.list_page(bucket, prefix, token, page_size)
        }
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_dropped_stream_resumes_without_loss_or_duplicates() -> Result<()> {
        let data = sample_jsonl();
        let plain = FakeObjectIO::new();
        plain.put_object("bucket", "part.jsonl", &data)?;
        let (expected, _) = scan(&plain, 64)?;

        let packed = gzip(&data)?;
        let store = CutsFirstStream {
            inner: FakeObjectIO::new(),
            cut: packed.len() / 2,
            opens: AtomicUsize::new(0),
        };
        store.put_object("bucket", "part.jsonl.gz", &packed)?;

        let matcher = Matcher::new(1, 1000, &["ももクロ"], MatchMode::Literal)?;
        let runner = Runner::new(&store, "bucket", matcher, SelectionPolicy::Exhaustive)
            .with_chunk_size(64);
        let mut sink = VecSink::new();
        let mut ctx = RunContext::new(42).with_retry(RetryConfig::immediate(3));
        let summary = runner.run(&mut ctx, &mut sink)?;

        assert_eq!(sink.rows, expected.rows);
        assert_eq!(summary.lines_scanned, 50);
        assert_eq!(summary.retries, 1);
        assert_eq!(summary.partitions_completed, 1);
        assert_eq!(store.opens.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn test_local_gzip_partition_is_streamed() -> Result<()> {
        use linesieve::io::cloud::LocalObjectIO;

        let dir = tempfile::tempdir()?;
        let store = LocalObjectIO::new(dir.path());
        store.put_object("ignored", "part.jsonl.gz", &gzip(&sample_jsonl())?)?;

        let mut body = String::new();
        linesieve::io::compression::CodecSet::builtin()
            .detect("part.jsonl.gz")
            .ok_or_else(|| anyhow::anyhow!("gzip codec missing"))?
            .wrap_reader_dyn(store.open_object("ignored", "part.jsonl.gz")?)?
            .read_to_string(&mut body)?;
        assert_eq!(body.lines().count(), 50);
        Ok(())
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_zstd_partition_matches_plain() -> Result<()> {
        let data = sample_jsonl();
        let plain = FakeObjectIO::new();
        plain.put_object("bucket", "part.jsonl", &data)?;
        let packed = FakeObjectIO::new();
        packed.put_object("bucket", "part.jsonl.zst", &zstd::encode_all(data.as_slice(), 3)?)?;

        let (expected, _) = scan(&plain, 100)?;
        let (got, _) = scan(&packed, 100)?;
        assert_eq!(got.rows, expected.rows);
        Ok(())
    }

    #[test]
    fn test_codec_detection_by_suffix() {
        let codecs = CodecSet::builtin();
        #[cfg(feature = "compression-gzip")]
        assert_eq!(codecs.detect("a/b.jsonl.gz").map(|c| c.name().to_string()).as_deref(), Some("gzip"));
        #[cfg(feature = "compression-zstd")]
        assert_eq!(codecs.detect("a/b.jsonl.ZSTD").map(|c| c.name().to_string()).as_deref(), Some("zstd"));
        assert!(codecs.detect("a/b.jsonl").is_none());
        assert!(CodecSet::none().detect("a/b.jsonl.gz").is_none());
    }
}
