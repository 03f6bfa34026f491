//! Property tests over random operation sequences on one volume.

use std::collections::HashMap;

use glusterblock::BlockError;
use glusterblock_test_utils::TestDriver;
use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
enum Op {
    Create,
    Mount,
    Unmount,
    Remove,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => Just(Op::Create),
        3 => Just(Op::Mount),
        3 => Just(Op::Unmount),
        1 => Just(Op::Remove),
    ]
}

/// Expected state: `None` while the volume does not exist, else its count.
async fn run_sequence(ops: Vec<Op>) {
    let ctx = TestDriver::new().await;
    let driver = &ctx.driver;
    let mut model: Option<u32> = None;

    for (step, op) in ops.into_iter().enumerate() {
        match op {
            Op::Create => {
                driver.create("db", &HashMap::new()).await.unwrap();
                model.get_or_insert(0);
            }
            Op::Mount => match model.as_mut() {
                Some(count) => {
                    driver.mount("db", &format!("m{step}")).await.unwrap();
                    *count += 1;
                }
                None => assert!(matches!(
                    driver.mount("db", "m").await,
                    Err(BlockError::NotFound(_))
                )),
            },
            Op::Unmount => match model.as_mut() {
                Some(0) => assert!(matches!(
                    driver.unmount("db", "m").await,
                    Err(BlockError::InvalidState { .. })
                )),
                Some(count) => {
                    driver.unmount("db", "m").await.unwrap();
                    *count -= 1;
                }
                None => assert!(matches!(
                    driver.unmount("db", "m").await,
                    Err(BlockError::NotFound(_))
                )),
            },
            Op::Remove => match model {
                Some(0) => {
                    driver.remove("db").await.unwrap();
                    model = None;
                }
                Some(_) => assert!(matches!(
                    driver.remove("db").await,
                    Err(BlockError::InUse { .. })
                )),
                None => assert!(matches!(
                    driver.remove("db").await,
                    Err(BlockError::NotFound(_))
                )),
            },
        }

        match model {
            Some(count) => {
                let volume = driver.get("db").unwrap();
                assert_eq!(volume.mount_count, count, "after {op:?} at step {step}");
                assert_eq!(ctx.host.is_mounted(&volume.mount_point), count > 0);
                assert_eq!(volume.loop_device.is_some(), count > 0);
                assert!(volume.backing_file.is_file());
            }
            None => assert!(matches!(driver.get("db"), Err(BlockError::NotFound(_)))),
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn mount_count_tracks_net_mounts(ops in prop::collection::vec(op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_sequence(ops));
    }
}
