use cloudthumb::batch::BatchEvent;
use cloudthumb::batch::BatchOrchestrator;
use cloudthumb::history::EditHistory;
use cloudthumb::model::ImageFilters;
use cloudthumb::model::OutputConfig;
use cloudthumb::model::OutputFormat;
use cloudthumb::model::ProcessingSource;
use cloudthumb::model::ProcessingStatus;
use cloudthumb::model::SourceAsset;
use cloudthumb::pipeline::ItemPipeline;
use cloudthumb::staging;
use cloudthumb::tagging::OfflineTagger;
use cloudthumb::telemetry::Telemetry;
use image::ImageFormat;
use image::Rgb;
use image::RgbImage;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn local_orchestrator() -> BatchOrchestrator {
    let pipeline = ItemPipeline::new(Arc::new(OfflineTagger), Arc::new(Telemetry::default()));
    BatchOrchestrator::new(pipeline).with_settle_delay(Duration::ZERO)
}

#[tokio::test]
async fn staged_directory_renders_locally_in_order() {
    let td = tempdir().unwrap();
    for (name, w) in [("a.png", 640), ("b.png", 200), ("c.png", 320)] {
        std::fs::write(td.path().join(name), png(w, 100)).unwrap();
    }
    std::fs::write(td.path().join("readme.txt"), b"not an image").unwrap();

    let telemetry = Telemetry::default();
    let staged = staging::stage(&[td.path().display().to_string()], &telemetry).unwrap();
    assert_eq!(staged.assets.len(), 3);

    let config = OutputConfig {
        format: OutputFormat::Png,
        ..OutputConfig::default()
    };
    let mut events = local_orchestrator().run_batch(staged.assets, config);

    let mut progress = Vec::new();
    let mut results = None;
    while let Some(event) = events.recv().await {
        match event {
            BatchEvent::Progress { current, total } => {
                assert_eq!(total, 3);
                progress.push(current);
            }
            BatchEvent::Completed { results: r } => results = Some(r),
            BatchEvent::Started { total } => assert_eq!(total, 3),
            BatchEvent::ItemUpdated(_) => {}
        }
    }
    assert_eq!(progress, vec![0, 1, 2, 3]);

    let results = results.unwrap();
    let names: Vec<_> = results.iter().map(|r| r.original_name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.png", "c.png"]);
    for result in &results {
        assert_eq!(result.status, ProcessingStatus::Completed);
        assert_eq!(result.source, ProcessingSource::Local);
        assert!(result.final_name.ends_with(".png"));
        let bytes = result.thumbnail.as_ref().unwrap().to_bytes().unwrap();
        assert_eq!(result.size_bytes, bytes.len() as u64);
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(img.width() <= 300);
    }
}

#[tokio::test]
async fn unreadable_asset_fails_without_stopping_the_batch() {
    let assets = vec![
        SourceAsset::new("good.png", "image/png", png(50, 50)),
        SourceAsset::new("broken.png", "image/png", b"garbage".to_vec()),
    ];
    let mut events = local_orchestrator().run_batch(assets, OutputConfig::default());
    let mut results = None;
    while let Some(event) = events.recv().await {
        if let BatchEvent::Completed { results: r } = event {
            results = Some(r);
        }
    }
    let results = results.unwrap();
    assert_eq!(results[0].status, ProcessingStatus::Completed);
    assert_eq!(results[1].status, ProcessingStatus::Error);
    assert!(results[1].error.is_some());
}

#[test]
fn edit_history_saves_from_original_after_undo() {
    let original = SourceAsset::new("photo.png", "image/png", png(80, 40));
    let opened = cloudthumb::model::ProcessingResult::started(&original, ProcessingSource::Local);
    let mut history = EditHistory::open(&opened);
    history.commit(ImageFilters::IDENTITY.rotated_by(90));
    history.commit(ImageFilters {
        brightness: 150.0,
        ..history.current()
    });
    assert!(history.undo());

    let config = OutputConfig {
        format: OutputFormat::Png,
        max_width: 80,
        ..OutputConfig::default()
    };
    let saved = history.save(&original, &opened, &config).unwrap();
    let img = image::load_from_memory(&saved.thumbnail.unwrap().to_bytes().unwrap()).unwrap();
    assert_eq!((img.width(), img.height()), (40, 80));
}
