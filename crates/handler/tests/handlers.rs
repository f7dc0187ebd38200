//! Handlers sharing sinks through one resource manager.

use std::sync::Arc;

use logbuch_handler::{
    BlockingHandler, BlockingStreamHandler, Handler, JsonFormatter, Level, LevelFilter, Record,
    StreamHandler,
};
use logbuch_streams::{Config, ResourceManager, SinkId};
use tempfile::tempdir;

fn manager(raise_on_internal_error: bool) -> Arc<ResourceManager> {
    let config = Config::builder()
        .raise_on_internal_error(raise_on_internal_error)
        .build();

    Arc::new(ResourceManager::new(config))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_share_a_file() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempdir().unwrap();
    let path = dir.path().join("app.log");
    let manager = manager(true);

    let handlers: Vec<_> = (0..2)
        .map(|_| Arc::new(StreamHandler::new(Arc::clone(&manager), path.as_path())))
        .collect();

    let mut tasks = Vec::new();
    for (index, handler) in handlers.iter().enumerate() {
        let handler = Arc::clone(handler);
        tasks.push(tokio::spawn(async move {
            for message in 0..50 {
                let record = Record::new(Level::Info, "app", format!("handler {index} message {message}"));
                handler.handle(&record).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(manager.ref_count(&SinkId::file(&path)), Some(2));
    for handler in &handlers {
        handler.close().await.unwrap();
    }
    assert!(!manager.is_registered(&SinkId::file(&path)));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 100);
    assert!(contents.ends_with('\n'));
    for line in lines {
        assert!(line.starts_with("[timestamp] "));
        assert!(line.contains("[level] INFO | "));
        assert!(line.contains("[logger_name] app | "));
    }
}

#[tokio::test]
async fn test_sink_is_acquired_lazily_and_rearmed_on_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("lazy.log");
    let sink = SinkId::file(&path);
    let manager = manager(true);
    let handler = StreamHandler::new(Arc::clone(&manager), sink.clone());

    assert_eq!(manager.ref_count(&sink), None);
    assert!(!path.exists());

    handler.handle(&Record::new(Level::Info, "app", "first")).await;
    assert_eq!(manager.ref_count(&sink), Some(1));

    handler.close().await.unwrap();
    handler.close().await.unwrap();
    assert_eq!(manager.ref_count(&sink), None);

    handler.handle(&Record::new(Level::Info, "app", "second")).await;
    assert_eq!(manager.ref_count(&sink), Some(1));
    handler.close().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 2);
    assert!(contents.contains("[message] first"));
    assert!(contents.contains("[message] second"));
}

#[tokio::test]
async fn test_filtered_records_never_touch_the_sink() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("filtered.log");
    let manager = manager(true);
    let handler = StreamHandler::new(Arc::clone(&manager), path.as_path())
        .with_filter(LevelFilter::new(Level::Error));

    handler.handle(&Record::new(Level::Warning, "app", "ignored")).await;

    assert!(!manager.is_registered(handler.sink()));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_write_failures_do_not_reach_the_caller() {
    let dir = tempdir().unwrap();

    for raise in [false, true] {
        let manager = manager(raise);
        let handler = StreamHandler::new(Arc::clone(&manager), dir.path());

        handler.handle(&Record::new(Level::Error, "app", "unwritable")).await;

        assert!(!manager.is_registered(handler.sink()));
        handler.close().await.unwrap();
    }
}

#[test]
fn test_blocking_handler_writes_json_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocking.jsonl");
    let manager = manager(true);

    let threads: Vec<_> = (0..3)
        .map(|index| {
            let handler = BlockingStreamHandler::new(Arc::clone(&manager), path.as_path())
                .with_formatter(JsonFormatter);
            std::thread::spawn(move || {
                for message in 0..20 {
                    let record = Record::new(Level::Debug, "worker", format!("{index}:{message}"));
                    handler.handle(&record);
                }
                handler.close().unwrap();
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert!(!manager.is_registered(&SinkId::file(&path)));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 60);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["level"], "DEBUG");
        assert_eq!(value["logger_name"], "worker");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_handler_on_runtime_threads_writes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("runtime.log");
    let manager = manager(true);
    let handler = Arc::new(BlockingStreamHandler::new(Arc::clone(&manager), path.as_path()));

    handler.handle(&Record::new(Level::Info, "app", "from a worker"));
    assert_eq!(manager.ref_count(handler.sink()), Some(1));

    let pooled = {
        let handler = Arc::clone(&handler);
        tokio::task::spawn_blocking(move || {
            handler.handle(&Record::new(Level::Info, "app", "from the blocking pool"));
        })
    };
    pooled.await.unwrap();

    let spawned = {
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.handle(&Record::new(Level::Info, "app", "from a task"));
        })
    };
    spawned.await.unwrap();

    handler.close().unwrap();
    assert!(!manager.is_registered(handler.sink()));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("[message] from a worker"));
    assert!(lines[1].ends_with("[message] from the blocking pool"));
    assert!(lines[2].ends_with("[message] from a task"));
}

#[tokio::test]
async fn test_blocking_and_async_handlers_share_a_file_on_one_thread() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mixed.log");
    let manager = manager(true);
    let blocking = BlockingStreamHandler::new(Arc::clone(&manager), path.as_path());
    let stream = StreamHandler::new(Arc::clone(&manager), path.as_path());

    for message in 0..5 {
        blocking.handle(&Record::new(Level::Info, "sync", format!("{message}")));
        stream
            .handle(&Record::new(Level::Info, "async", format!("{message}")))
            .await;
    }
    assert_eq!(manager.ref_count(stream.sink()), Some(2));

    blocking.close().unwrap();
    stream.close().await.unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 10);
    assert_eq!(contents.matches("[logger_name] sync").count(), 5);
    assert_eq!(contents.matches("[logger_name] async").count(), 5);
}
