//! End-to-end tests for code-block processing

mod common;

use std::sync::Arc;

use common::{past_debounce, MockEngine};
use infographic_embed::block::{BlockErrorView, BlockOutcome, BlockProcessor};
use infographic_embed::cache::cache_path;
use infographic_embed::config::ErrorBehavior;
use infographic_embed::host::{MemoryContainer, MemoryStorage, MemoryTarget, SnapshotTarget};
use infographic_embed::{ImageFormat, LifecycleState, RenderRequest, Settings, Theme};

const CONFIG: &str = r#"{"template": "list-row-simple-horizontal-arrow", "data": {"items": [{"label": "A"}]}}"#;

fn processor(engine: &MockEngine, storage: &Arc<MemoryStorage>, settings: Settings) -> BlockProcessor {
    BlockProcessor::with_storage(engine.shared(), storage.clone(), settings)
}

fn mounted(outcome: BlockOutcome) -> infographic_embed::block::MountedBlock {
    match outcome {
        BlockOutcome::Mounted(block) => block,
        other => panic!("expected a mounted block, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn dark_host_block_renders_and_snapshots_in_dark() {
    let engine = MockEngine::new();
    let storage = Arc::new(MemoryStorage::new());
    let blocks = processor(&engine, &storage, Settings::default());
    let container = Arc::new(MemoryContainer::new(700.0));
    let target = Arc::new(MemoryTarget::new());

    let block = mounted(blocks.process(
        &format!("\n{}\n", CONFIG),
        true,
        container.clone(),
        target.clone(),
    ));
    assert_eq!(block.lifecycle.state(), LifecycleState::Rendered);
    assert_eq!(block.copy_text, CONFIG);
    assert!(block.show_source_button);

    let opts = engine.spy.last_options();
    assert_eq!(opts.theme(), Some("dark"));
    assert_eq!(opts.template(), Some("list-row-simple-horizontal-arrow"));

    past_debounce().await;
    let key = RenderRequest::new(CONFIG, true)
        .with_theme(Theme::Auto, true)
        .cache_key(ImageFormat::Png);
    assert_eq!(key, format!("dark|json|{}|png", CONFIG));
    let expected = cache_path(".infographic-cache", &key, ImageFormat::Png);
    let img = target.image().unwrap();
    assert_eq!(img.persisted_src.as_deref(), Some(format!("memory://{}", expected).as_str()));
}

#[tokio::test]
async fn auto_render_off_skips_blocks() {
    let engine = MockEngine::new();
    let storage = Arc::new(MemoryStorage::new());
    let settings = Settings {
        auto_render: false,
        ..Settings::default()
    };
    let blocks = processor(&engine, &storage, settings);

    let outcome = blocks.process(
        CONFIG,
        false,
        Arc::new(MemoryContainer::new(500.0)),
        Arc::new(MemoryTarget::new()),
    );

    assert!(matches!(outcome, BlockOutcome::Skipped));
    assert_eq!(engine.spy.constructs(), 0);
}

#[tokio::test]
async fn malformed_json_is_presented_per_error_behavior() {
    let engine = MockEngine::new();
    let storage = Arc::new(MemoryStorage::new());
    let source = r#"{"template": "x",}"#;
    let parser_msg = serde_json::from_str::<serde_json::Value>(source)
        .unwrap_err()
        .to_string();

    let blocks = processor(&engine, &storage, Settings::default());
    match blocks.process(source, false, Arc::new(MemoryContainer::new(500.0)), Arc::new(MemoryTarget::new())) {
        BlockOutcome::Failed(BlockErrorView::Code { header, source: shown }) => {
            assert!(header.starts_with("Error: Invalid JSON: "));
            assert!(header.contains(&parser_msg));
            assert_eq!(shown, source);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let hidden = processor(
        &engine,
        &storage,
        Settings {
            error_behavior: ErrorBehavior::Hide,
            ..Settings::default()
        },
    );
    let outcome = hidden.process("   ", false, Arc::new(MemoryContainer::new(500.0)), Arc::new(MemoryTarget::new()));
    assert!(matches!(outcome, BlockOutcome::Failed(BlockErrorView::Hidden)));
    assert_eq!(engine.spy.constructs(), 0);
}

#[tokio::test]
async fn engine_rejection_still_mounts_with_inline_error() {
    let engine = MockEngine::new().failing_construction("unknown template");
    let storage = Arc::new(MemoryStorage::new());
    let blocks = processor(&engine, &storage, Settings::default());
    let container = Arc::new(MemoryContainer::new(500.0));

    let block = mounted(blocks.process(CONFIG, false, container.clone(), Arc::new(MemoryTarget::new())));

    assert_eq!(block.lifecycle.state(), LifecycleState::Errored);
    assert!(container.error_message().unwrap().contains("unknown template"));
}

#[tokio::test(start_paused = true)]
async fn print_refresh_serializes_live_markup_until_unmounted() {
    let engine = MockEngine::new()
        .draws(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 5"/>"#);
    let storage = Arc::new(MemoryStorage::new());
    let blocks = processor(&engine, &storage, Settings::default());
    let targets: Vec<Arc<MemoryTarget>> = (0..2).map(|_| Arc::new(MemoryTarget::new())).collect();
    let _blocks: Vec<_> = targets
        .iter()
        .map(|target| {
            mounted(blocks.process("infographic list", false, Arc::new(MemoryContainer::new(400.0)), target.clone()))
        })
        .collect();

    // Before the debounced export lands, print falls back to the markup.
    assert_eq!(blocks.refresh_print_snapshots(), 2);
    assert!(targets.iter().all(|t| t.image().unwrap().data_source() == "domFallback"));

    // Once the engine snapshot is mounted it is left alone.
    past_debounce().await;
    assert!(targets.iter().all(|t| t.image().unwrap().data_source() == "engine"));
    assert_eq!(blocks.refresh_print_snapshots(), 0);

    blocks.unmount_all();
    assert_eq!(engine.spy.destroys(), 2);
    assert_eq!(blocks.refresh_print_snapshots(), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_blocks_are_torn_down_and_forgotten() {
    let engine = MockEngine::new();
    let storage = Arc::new(MemoryStorage::new());
    let blocks = processor(&engine, &storage, Settings::default());

    for _ in 0..3 {
        let outcome = blocks.process(
            CONFIG,
            false,
            Arc::new(MemoryContainer::new(400.0)),
            Arc::new(MemoryTarget::new()),
        );
        assert!(matches!(outcome, BlockOutcome::Mounted(_)));
    }

    assert_eq!(engine.spy.destroys(), 3);
    assert_eq!(blocks.mounted_count(), 0);
    assert_eq!(blocks.refresh_print_snapshots(), 0);

    let kept = mounted(blocks.process(
        CONFIG,
        false,
        Arc::new(MemoryContainer::new(400.0)),
        Arc::new(MemoryTarget::new()),
    ));
    assert_eq!(blocks.mounted_count(), 1);
    drop(kept);
    assert_eq!(blocks.mounted_count(), 0);
    assert_eq!(engine.spy.destroys(), 4);
}
