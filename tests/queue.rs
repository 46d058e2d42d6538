mod common;

use std::sync::Arc;

use completion_bootstrap::config::GenerationConfig;
use completion_bootstrap::device::ComputeBackend;
use completion_bootstrap::{EngineBuilder, GenerationModel, GenerationQueue, QueueError};
use candle_core::{DType, Device};
use tempfile::tempdir;

use common::{echo_model, echo_tokenizer, EchoLm, LLM_CONFIG, OK};

fn engine(dir: &std::path::Path) -> Arc<completion_bootstrap::GenerationEngine> {
    engine_with(dir, echo_model())
}

fn engine_with(dir: &std::path::Path, model: GenerationModel) -> Arc<completion_bootstrap::GenerationEngine> {
    let config: GenerationConfig = serde_json::from_str(LLM_CONFIG).unwrap();
    let engine = EngineBuilder::new(config)
        .with_model(Arc::new(model))
        .with_tokenizer(Arc::new(echo_tokenizer(dir, 128)))
        .build()
        .unwrap();
    Arc::new(engine)
}

#[tokio::test]
async fn queued_requests_run_in_submission_order() {
    let dir = tempdir().unwrap();
    let lm = EchoLm::new(vec![OK]);
    let prefills = lm.prefills();
    let model = GenerationModel::new(Box::new(lm), ComputeBackend::Cpu, Device::Cpu, DType::F32);
    let queue = GenerationQueue::new(engine_with(dir.path(), model), 8);

    let handles: Vec<_> = ["hello", "hello world", "hello world a"]
        .into_iter()
        .map(|prompt| queue.enqueue(prompt).unwrap())
        .collect();
    let ids: Vec<u64> = handles.iter().map(|h| h.job_id()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    for handle in handles {
        assert_eq!(handle.wait().await.unwrap().text, "OK");
    }
    assert_eq!(*prefills.lock(), vec![1, 2, 3]);
    assert_eq!(queue.stats().completed_jobs, 3);
}

#[tokio::test]
async fn failed_generation_reaches_caller() {
    let dir = tempdir().unwrap();
    let queue = GenerationQueue::new(engine(dir.path()), 8);

    let err = queue.submit("zzz").await.unwrap_err();
    assert!(matches!(err, QueueError::Generation(_)));

    assert_eq!(queue.submit("hello").await.unwrap().text, "OK");
}

#[tokio::test]
async fn shutdown_rejects_new_work() {
    let dir = tempdir().unwrap();
    let queue = GenerationQueue::new(engine(dir.path()), 8);

    queue.shutdown().await;
    assert!(matches!(queue.enqueue("hello"), Err(QueueError::Closed)));
}
