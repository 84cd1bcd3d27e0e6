//! Races between concurrent callers.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uniquefs::{FsConfig, FsError, FsOps, MountTable, UniqueFs};

const PAGE: usize = 128;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn load(config: FsConfig) -> UniqueFs {
    init_tracing();
    UniqueFs::load(config.with_page_size(PAGE)).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_unlink_exactly_one_wins() {
    let fs = load(FsConfig::default());
    for _round in 0..20 {
        fs.teardown().unwrap();
        let ns = fs.mount().unwrap();
        ns.create(Path::new("victim"), 0o644).await.unwrap();
        ns.write(Path::new("victim"), 0, &[1u8; 3 * PAGE])
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ns = Arc::clone(&ns);
                tokio::spawn(async move { ns.unlink(Path::new("victim")).await })
            })
            .collect();

        let mut ok = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => assert!(matches!(e, FsError::NotFound(_))),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(ns.entry_count(), 0);
        assert_eq!(fs.live_pages(), 0);

        ns.unmount().unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_create_respects_cap() {
    let fs = load(FsConfig::default().with_max_entries(3));
    let ns = fs.mount().unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let ns = Arc::clone(&ns);
            tokio::spawn(async move { ns.create(Path::new(&format!("f{i}")), 0o644).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert!(matches!(e, FsError::CapacityExceeded { count: 3, max: 3 })),
        }
    }
    assert_eq!(created, 3);
    assert_eq!(ns.entry_count(), 3);
    assert_eq!(ns.readdir(Path::new("/")).await.unwrap().len(), 3);
}

#[test]
fn create_unlink_churn_keeps_count_consistent() {
    let fs = load(FsConfig::default().with_max_entries(2));
    let ns = fs.mount().unwrap();

    std::thread::scope(|s| {
        for t in 0..6 {
            let ns = Arc::clone(&ns);
            s.spawn(move || {
                let name = format!("t{}", t % 3);
                for _ in 0..200 {
                    if ns.create_file(&name, 0o644).is_ok() {
                        let _ = ns.unlink_file(&name);
                    }
                }
            });
        }
    });

    assert_eq!(ns.entry_count(), 0);
    assert_eq!(fs.live_pages(), 0);
}

#[test]
fn concurrent_mounts_respect_quota() {
    let fs = load(FsConfig::default().with_total_capacity(4));

    let mounted: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let fs = fs.clone();
                s.spawn(move || fs.mount())
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().unwrap().ok())
            .collect()
    });

    assert_eq!(mounted.len(), 4);
    assert_eq!(fs.quota().available(), 0);
    assert_eq!(fs.active_mounts(), 4);
}

#[test]
fn readers_never_see_torn_growth() {
    let fs = load(FsConfig::default());
    let ns = fs.mount().unwrap();
    let file = ns.create_file("grow", 0o644).unwrap();

    std::thread::scope(|s| {
        let writer = Arc::clone(&file);
        s.spawn(move || {
            for i in 0..64usize {
                writer.write((i * PAGE) as u64, &[0xEE; PAGE]).unwrap();
            }
        });

        for _ in 0..3 {
            let reader = Arc::clone(&file);
            s.spawn(move || {
                for _ in 0..200 {
                    let data = reader.read(0, 64 * PAGE).unwrap();
                    // Whatever length is visible, it is fully written.
                    assert_eq!(data.len() % PAGE, 0);
                    assert!(data.iter().all(|&b| b == 0xEE));
                }
            });
        }
    });

    assert_eq!(file.page_count(), 64);
}

#[test]
fn faults_race_with_writers() {
    let fs = load(FsConfig::default());
    let ns = fs.mount().unwrap();
    let file = ns.create_file("mapped", 0o644).unwrap();
    file.write(0, &[0u8; PAGE]).unwrap();

    std::thread::scope(|s| {
        let writer = Arc::clone(&file);
        s.spawn(move || {
            for i in 1..32usize {
                writer.write((i * PAGE) as u64, &[i as u8; PAGE]).unwrap();
            }
        });

        let ns = Arc::clone(&ns);
        s.spawn(move || {
            for _ in 0..500 {
                let page = ns.mmap_fault_file("mapped", 0).unwrap();
                assert_eq!(page.index(), 0);
                page.with_mapped_mut(|buf| buf[0] = 0x55);
            }
        });
    });

    assert_eq!(file.read(0, 1).unwrap(), [0x55u8]);
    assert_eq!(file.size(), (32 * PAGE) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mount_table_routes_parallel_traffic() {
    let fs = load(FsConfig::default().with_total_capacity(2).with_max_entries(1));
    let table = Arc::new(MountTable::new());
    table.mount("/one", &fs).await.unwrap();
    table.mount("/two", &fs).await.unwrap();

    let tasks: Vec<_> = ["/one/a", "/two/b"]
        .into_iter()
        .map(|path| {
            let table = Arc::clone(&table);
            tokio::spawn(async move {
                table.create(Path::new(path), 0o644).await?;
                table.write(Path::new(path), 0, path.as_bytes()).await?;
                table.read_all(Path::new(path)).await
            })
        })
        .collect();

    for (task, path) in tasks.into_iter().zip(["/one/a", "/two/b"]) {
        assert_eq!(task.await.unwrap().unwrap(), path.as_bytes());
    }
    assert_eq!(fs.live_pages(), 2);
}
