/// Storyboard integration tests
/// Bulk runs, single-frame operations and the races between them
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use storyboard::*;
use tokio::sync::Notify;

/// Image generator that holds each gated prompt until the test releases it.
/// Ungated prompts return immediately. Prompts marked with `fail_on` fail
/// once released.
struct GatedGenerator {
    gates: HashMap<String, Arc<Notify>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl GatedGenerator {
    fn new(gated: &[&str]) -> Self {
        Self {
            gates: gated
                .iter()
                .map(|p| (p.to_string(), Arc::new(Notify::new())))
                .collect(),
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn fail_on(mut self, prompt: &str) -> Self {
        self.failing.insert(prompt.to_string());
        self
    }

    fn release(&self, prompt: &str) {
        self.gates[prompt].notify_one();
    }
}

#[async_trait::async_trait]
impl ImageGenerator for GatedGenerator {
    fn name(&self) -> &str {
        "gated"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Mock
    }

    async fn generate_image(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.gates.get(prompt) {
            gate.notified().await;
        }
        if self.failing.contains(prompt) {
            return Err(BackendError::other(format!("no image for {prompt}")));
        }
        Ok(image_for(prompt))
    }
}

fn image_for(prompt: &str) -> String {
    format!("https://images.test/{}.png", prompt.replace(' ', "-"))
}

fn generator_with(scenes: &[&str], images: Arc<GatedGenerator>) -> StoryboardGenerator {
    StoryboardGenerator::new(Backends::new(
        Arc::new(MockSceneSplitter::with_scenes(scenes.iter().copied())),
        images,
    ))
}

fn prompts(frames: &[Frame]) -> Vec<String> {
    frames.iter().map(|f| f.prompt.clone()).collect()
}

fn status_of(store: &FrameStore, prompt: &str) -> FrameStatus {
    store
        .snapshot()
        .iter()
        .find(|f| f.prompt == prompt)
        .map(Frame::status)
        .expect("frame with prompt")
}

async fn wait_until<F>(store: &FrameStore, mut ready: F)
where
    F: FnMut(&[Frame]) -> bool,
{
    let mut rx = store.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|frames| ready(frames.as_slice())))
        .await
        .expect("timed out waiting for store")
        .expect("store sender dropped");
}

async fn wait_until_seeded(store: &FrameStore, count: usize) {
    wait_until(store, |frames| {
        frames.len() == count && frames.iter().all(|f| f.status() == FrameStatus::Generating)
    })
    .await;
}

#[tokio::test]
async fn test_every_scene_becomes_a_settled_frame() {
    let generator = StoryboardGenerator::new(Backends::new(
        Arc::new(MockSceneSplitter::new()),
        Arc::new(MockImageGenerator::new().fail_on("Mark knocks over the sugar.")),
    ));
    let script = "INT. COFFEE SHOP - DAY.\nJane sips her latte.\n\n\
                  Mark enters.\n\n\
                  Mark knocks over the sugar.\n\n\
                  They both laugh.";

    let summary = generator.generate(script).await.unwrap();
    assert_eq!(summary.total, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let frames = generator.frames();
    assert_eq!(frames.len(), 4);
    for frame in frames.iter() {
        match &frame.state {
            FrameState::Done { image_url } => assert!(!image_url.is_empty()),
            FrameState::Error { .. } => assert!(frame.image_url().is_none()),
            other => panic!("frame left unsettled: {other:?}"),
        }
    }
    assert_eq!(frames[2].status(), FrameStatus::Error);
    assert!(!generator.status().is_loading());
}

#[tokio::test]
async fn test_blank_script_is_rejected_without_splitting() {
    let splitter = Arc::new(MockSceneSplitter::new());
    let generator = StoryboardGenerator::new(Backends::new(
        splitter.clone(),
        Arc::new(MockImageGenerator::new()),
    ));
    let existing = generator.add_frame();
    let before = generator.frames();

    for script in ["", "   ", "\n\t\n"] {
        let err = generator.generate(script).await.unwrap_err();
        assert!(matches!(err, StoryboardError::EmptyScript));
        assert_eq!(err.to_string(), "Script cannot be empty.");
    }

    assert_eq!(splitter.calls(), 0);
    assert_eq!(generator.frames(), before);
    assert!(generator.store().contains(existing));
    assert!(!generator.status().is_loading());
}

#[tokio::test]
async fn test_split_failure_leaves_store_empty() {
    let generator = StoryboardGenerator::new(Backends::new(
        Arc::new(MockSceneSplitter::failing("model overloaded")),
        Arc::new(MockImageGenerator::new()),
    ));
    generator.add_frame();
    generator.add_frame();

    let err = generator.generate("A script.").await.unwrap_err();
    assert!(matches!(err, StoryboardError::Split(_)));
    assert!(generator.store().is_empty());

    let status = generator.status();
    assert!(!status.is_loading());
    assert!(status.last_error.is_some());
}

#[tokio::test]
async fn test_patch_for_unknown_id_is_a_no_op() {
    let store = FrameStore::with_frames(vec![Frame::new("A"), Frame::new("B")]);
    let before = store.snapshot();
    let rx = store.subscribe();

    assert!(!store.patch_by_id(FrameId::new(), FramePatch::prompt("ghost")));
    assert!(!store.remove_by_id(FrameId::new()));

    assert_eq!(store.snapshot(), before);
    assert!(!rx.has_changed().unwrap());
}

#[tokio::test]
async fn test_completion_order_does_not_matter() {
    let images = Arc::new(GatedGenerator::new(&["A", "B", "C"]));
    let generator = generator_with(&["A", "B", "C"], images.clone());
    let store = generator.store().clone();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("three scenes").await }
    });
    wait_until_seeded(&store, 3).await;

    // Last frame finishes first.
    images.release("C");
    wait_until(&store, |frames| frames[2].status() == FrameStatus::Done).await;
    assert_eq!(status_of(&store, "A"), FrameStatus::Generating);
    assert_eq!(status_of(&store, "B"), FrameStatus::Generating);

    images.release("A");
    wait_until(&store, |frames| frames[0].status() == FrameStatus::Done).await;
    assert_eq!(status_of(&store, "B"), FrameStatus::Generating);

    images.release("B");
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 3);

    let frames = store.snapshot();
    assert_eq!(prompts(&frames), vec!["A", "B", "C"]);
    for frame in frames.iter() {
        assert_eq!(frame.image_url(), Some(image_for(&frame.prompt).as_str()));
    }
}

/// Run scenes A, B, C (B fails) releasing images in `order`, and return the
/// settled `(prompt, status, image)` of every frame.
async fn settle_in_order(order: &[&str]) -> Vec<(String, FrameStatus, Option<String>)> {
    let images = Arc::new(GatedGenerator::new(&["A", "B", "C"]).fail_on("B"));
    let generator = generator_with(&["A", "B", "C"], images.clone());
    let store = generator.store().clone();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("three scenes").await }
    });
    wait_until_seeded(&store, 3).await;

    for prompt in order {
        images.release(prompt);
        wait_until(&store, |frames| {
            frames
                .iter()
                .any(|f| f.prompt == *prompt && f.state.is_settled())
        })
        .await;
    }
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);

    store
        .snapshot()
        .iter()
        .map(|f| (f.prompt.clone(), f.status(), f.image_url().map(str::to_string)))
        .collect()
}

#[tokio::test]
async fn test_forward_and_reverse_completion_agree() {
    let forward = settle_in_order(&["A", "B", "C"]).await;
    let reverse = settle_in_order(&["C", "B", "A"]).await;

    assert_eq!(forward, reverse);
    assert_eq!(
        forward,
        vec![
            ("A".to_string(), FrameStatus::Done, Some(image_for("A"))),
            ("B".to_string(), FrameStatus::Error, None),
            ("C".to_string(), FrameStatus::Done, Some(image_for("C"))),
        ]
    );
}

#[tokio::test]
async fn test_mock_splitter_handles_crlf_and_padded_blank_lines() {
    let generator = StoryboardGenerator::new(BackendFactory::mock());
    let summary = generator.generate("one\r\n\r\ntwo\n  \nthree").await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(prompts(&generator.frames()), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_move_and_delete_keep_relative_order() {
    let generator = StoryboardGenerator::new(BackendFactory::mock());
    let ids: Vec<FrameId> = ["A", "B", "C"]
        .into_iter()
        .map(|prompt| {
            let id = generator.add_frame();
            generator.edit_prompt(id, prompt);
            id
        })
        .collect();

    assert!(generator.move_frame(0, 2));
    assert_eq!(prompts(&generator.frames()), vec!["B", "C", "A"]);

    assert!(!generator.move_frame(0, 3));
    assert_eq!(prompts(&generator.frames()), vec!["B", "C", "A"]);

    assert!(generator.move_frame(2, 0));
    assert!(generator.delete_frame(ids[1]));
    assert_eq!(prompts(&generator.frames()), vec!["A", "C"]);
    assert!(!generator.delete_frame(ids[1]));
}

#[tokio::test]
async fn test_regenerate_during_bulk_run_touches_only_its_frame() {
    let images = Arc::new(GatedGenerator::new(&["A", "B"]));
    let generator = generator_with(&["A", "B", "C"], images.clone());
    let store = generator.store().clone();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("three scenes").await }
    });
    // C is ungated, so it settles on its own while A and B stay in flight.
    wait_until(&store, |frames| {
        frames.len() == 3 && frames[2].status() == FrameStatus::Done
    })
    .await;

    let c = store.snapshot()[2].id;
    assert!(generator.edit_prompt(c, "C at night"));
    let state = generator.regenerate(c).await.unwrap();
    assert_eq!(state.image_url(), Some(image_for("C at night").as_str()));

    assert_eq!(status_of(&store, "A"), FrameStatus::Generating);
    assert_eq!(status_of(&store, "B"), FrameStatus::Generating);

    images.release("B");
    images.release("A");
    run.await.unwrap().unwrap();

    let frames = store.snapshot();
    assert_eq!(prompts(&frames), vec!["A", "B", "C at night"]);
    assert!(frames.iter().all(|f| f.status() == FrameStatus::Done));
    assert_eq!(frames[2].image_url(), Some(image_for("C at night").as_str()));
}

#[tokio::test]
async fn test_second_run_is_rejected_while_one_is_in_flight() {
    let images = Arc::new(GatedGenerator::new(&["slow"]));
    let generator = generator_with(&["slow"], images.clone());
    let store = generator.store().clone();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("first").await }
    });
    wait_until_seeded(&store, 1).await;
    assert!(generator.is_running());
    assert!(generator.status().is_loading());

    let err = generator.generate("second").await.unwrap_err();
    assert!(matches!(err, StoryboardError::RunInProgress));
    assert_eq!(prompts(&store.snapshot()), vec!["slow"]);

    images.release("slow");
    run.await.unwrap().unwrap();
    assert!(!generator.is_running());
    assert_eq!(images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_regenerate_result_is_discarded_after_reseed() {
    let images = Arc::new(GatedGenerator::new(&["old scene"]));
    let generator = generator_with(&["new one", "new two"], images.clone());
    let store = generator.store().clone();

    let id = generator.add_frame();
    generator.edit_prompt(id, "old scene");

    let regen = tokio::spawn({
        let generator = generator.clone();
        async move { generator.regenerate(id).await }
    });
    wait_until(&store, |frames| {
        frames.iter().any(|f| f.id == id && f.status() == FrameStatus::Generating)
    })
    .await;

    generator.generate("a new script").await.unwrap();
    let reseeded = store.snapshot();
    assert_eq!(prompts(&reseeded), vec!["new one", "new two"]);

    images.release("old scene");
    let state = regen.await.unwrap().unwrap();
    assert_eq!(state.status(), FrameStatus::Done);

    assert!(!store.contains(id));
    assert_eq!(store.snapshot(), reseeded);
}

#[tokio::test]
async fn test_deleting_a_frame_mid_generation_drops_its_result() {
    let images = Arc::new(GatedGenerator::new(&["B"]));
    let generator = generator_with(&["A", "B"], images.clone());
    let store = generator.store().clone();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("two scenes").await }
    });
    wait_until(&store, |frames| {
        frames.len() == 2 && frames[0].status() == FrameStatus::Done
    })
    .await;

    let b = store.snapshot()[1].id;
    assert!(generator.delete_frame(b));

    images.release("B");
    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.total, 2);

    let frames = store.snapshot();
    assert_eq!(prompts(&frames), vec!["A"]);
    assert_eq!(frames[0].status(), FrameStatus::Done);
}

#[tokio::test]
async fn test_status_reports_progress() {
    let images = Arc::new(GatedGenerator::new(&["A", "B"]));
    let generator = generator_with(&["A", "B"], images.clone());
    let mut status_rx = generator.subscribe_status();

    let run = tokio::spawn({
        let generator = generator.clone();
        async move { generator.generate("two scenes").await }
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        status_rx.wait_for(|s| matches!(s.state, RunState::Generating { settled: 0, total: 2 })),
    )
    .await
    .expect("timed out waiting for generating state")
    .unwrap();

    images.release("A");
    tokio::time::timeout(
        Duration::from_secs(5),
        status_rx.wait_for(|s| matches!(s.state, RunState::Generating { settled: 1, total: 2 })),
    )
    .await
    .expect("timed out waiting for progress")
    .unwrap();

    images.release("B");
    run.await.unwrap().unwrap();
    assert_eq!(generator.status().state, RunState::Idle);
    assert!(generator.status().message.is_none());
}
