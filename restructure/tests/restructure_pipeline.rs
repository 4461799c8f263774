//! End-to-end restructure scenarios over local storage.

mod support;

use restructure::RestructurePipeline;
use restructure::storage::LocalStorage;
use restructure::types::{OffsetRange, TopicPartition};
use support::{HOUR_NANOS, local_config, record_at, write_landing_file};
use tempfile::TempDir;

struct Fixture {
    source: TempDir,
    target: TempDir,
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            target: TempDir::new().unwrap(),
            tmp: TempDir::new().unwrap(),
        }
    }

    async fn pipeline(&self) -> RestructurePipeline<LocalStorage, LocalStorage> {
        let config = local_config(self.source.path(), self.target.path(), self.tmp.path());
        RestructurePipeline::new(
            config,
            LocalStorage::new(self.source.path()),
            LocalStorage::new(self.target.path()),
        )
        .await
        .unwrap()
    }

    async fn pipeline_with(
        &self,
        tweak: impl FnOnce(&mut restructure_config::shared::RestructureConfig),
    ) -> RestructurePipeline<LocalStorage, LocalStorage> {
        let mut config = local_config(self.source.path(), self.target.path(), self.tmp.path());
        tweak(&mut config);
        RestructurePipeline::new(
            config,
            LocalStorage::new(self.source.path()),
            LocalStorage::new(self.target.path()),
        )
        .await
        .unwrap()
    }
}

#[tokio::test]
async fn two_records_in_one_hour_share_one_output_file() {
    let fixture = Fixture::new();
    write_landing_file(
        fixture.source.path(),
        "t",
        0,
        0,
        &[record_at(0), record_at(1_000)],
    );

    let pipeline = fixture.pipeline().await;
    let summary = pipeline.run_restructure_pass().await.unwrap();

    assert_eq!(summary.topics_processed, 1);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.records_written, 2);

    let output = fixture.target.path().join("t/radar/u1/s1/19700101_00.csv");
    let content = std::fs::read_to_string(&output).unwrap();
    assert_eq!(content.lines().count(), 3);

    let offsets =
        std::fs::read_to_string(fixture.target.path().join("offsets.csv")).unwrap();
    assert!(offsets.contains("0,1,0,t"));

    let accounted = pipeline.accounted_offsets().await;
    assert!(accounted.contains(&OffsetRange::new(TopicPartition::new("t", 0), 0, 1)));

    pipeline.close().await.unwrap();
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let fixture = Fixture::new();
    write_landing_file(
        fixture.source.path(),
        "t",
        0,
        0,
        &[record_at(0), record_at(1_000)],
    );

    let pipeline = fixture.pipeline().await;
    pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    let output = fixture.target.path().join("t/radar/u1/s1/19700101_00.csv");
    let first_content = std::fs::read(&output).unwrap();
    let first_offsets = std::fs::read(fixture.target.path().join("offsets.csv")).unwrap();

    // A fresh pipeline recovers the accounted offsets and skips everything.
    let pipeline = fixture.pipeline().await;
    let summary = pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    assert_eq!(summary.files_processed, 0);
    assert_eq!(summary.records_written, 0);
    assert_eq!(std::fs::read(&output).unwrap(), first_content);
    assert_eq!(
        std::fs::read(fixture.target.path().join("offsets.csv")).unwrap(),
        first_offsets
    );

    // No staged temp files leak into the shared tmp dir.
    let leftovers: Vec<_> = std::fs::read_dir(fixture.tmp.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn cache_of_one_evicts_mid_file_and_publishes_both_buckets() {
    let fixture = Fixture::new();
    let records: Vec<_> = (0..10)
        .map(|i| record_at(i % 2 * HOUR_NANOS + i * 1_000))
        .collect();
    write_landing_file(fixture.source.path(), "t", 0, 0, &records);

    let pipeline = fixture
        .pipeline_with(|config| config.workers.cache_size = 1)
        .await;
    let summary = pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    assert_eq!(summary.records_written, 10);
    let first = fixture.target.path().join("t/radar/u1/s1/19700101_00.csv");
    let second = fixture.target.path().join("t/radar/u1/s1/19700101_01.csv");
    assert!(first.exists());
    assert!(second.exists());

    let first_rows = std::fs::read_to_string(&first).unwrap().lines().count() - 1;
    let second_rows = std::fs::read_to_string(&second).unwrap().lines().count() - 1;
    assert_eq!(first_rows + second_rows, 10);
}

#[tokio::test]
async fn young_files_are_skipped() {
    let fixture = Fixture::new();
    write_landing_file(fixture.source.path(), "t", 0, 0, &[record_at(0)]);

    let pipeline = fixture
        .pipeline_with(|config| config.workers.min_file_age_secs = 3_600)
        .await;
    let summary = pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    assert_eq!(summary.files_processed, 0);
    assert!(!fixture.target.path().join("t").exists());
}

#[tokio::test]
async fn excluded_topics_are_not_processed() {
    let fixture = Fixture::new();
    write_landing_file(fixture.source.path(), "keep", 0, 0, &[record_at(0)]);
    write_landing_file(fixture.source.path(), "skip", 0, 0, &[record_at(0)]);

    let pipeline = fixture
        .pipeline_with(|config| config.topics.exclude = vec!["skip".to_string()])
        .await;
    pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    assert!(fixture.target.path().join("keep").exists());
    assert!(!fixture.target.path().join("skip").exists());
}

#[tokio::test]
async fn empty_source_file_commits_nothing() {
    let fixture = Fixture::new();
    write_landing_file(fixture.source.path(), "t", 0, 0, &[]);

    let pipeline = fixture.pipeline().await;
    let summary = pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    assert_eq!(summary.files_processed, 0);
    assert_eq!(summary.records_written, 0);
    assert!(!fixture.target.path().join("offsets.csv").exists());
}

#[tokio::test]
async fn deduplication_collapses_repeated_records() {
    let fixture = Fixture::new();
    write_landing_file(
        fixture.source.path(),
        "t",
        0,
        0,
        &[record_at(0), record_at(0), record_at(1_000)],
    );

    let pipeline = fixture
        .pipeline_with(|config| config.format.deduplicate.enable = true)
        .await;
    pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    let output = fixture.target.path().join("t/radar/u1/s1/19700101_00.csv");
    let content = std::fs::read_to_string(&output).unwrap();
    // Header plus two distinct rows.
    assert_eq!(content.lines().count(), 3);
}

#[tokio::test]
async fn gzip_output_round_trips() {
    let fixture = Fixture::new();
    write_landing_file(fixture.source.path(), "t", 0, 0, &[record_at(0)]);

    let pipeline = fixture
        .pipeline_with(|config| {
            config.format.compression = restructure_config::shared::CompressionKind::Gzip;
        })
        .await;
    pipeline.run_restructure_pass().await.unwrap();
    pipeline.close().await.unwrap();

    let output = fixture.target.path().join("t/radar/u1/s1/19700101_00.csv.gz");
    let bytes = std::fs::read(&output).unwrap();
    let content = restructure::compression::decompress(
        restructure_config::shared::CompressionKind::Gzip,
        &bytes,
    )
    .unwrap();
    assert!(String::from_utf8(content).unwrap().contains("key.projectId"));
}
