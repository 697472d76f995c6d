#[cfg(test)]
mod tests {
    //! Property-based tests over the full store/retrieve path.

    use std::collections::HashSet;
    use std::fs;
    use std::future::Future;

    use proptest::prelude::*;

    use nearline_core::{ArchiveConfig, Operation, RecordingSink};
    use nearline_engine::{ArchiveEngine, MockSessionPool};

    use crate::harness::{random_payload, stage_file, TestEnv};

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            archive_name: "vault".to_string(),
            tar_size_threshold: 5000,
            max_file_size: 15000,
            max_tar_size: 5000,
            ..Default::default()
        }
    }

    fn run<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build runtime")
            .block_on(future)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Any mix of sizes across all three strategies survives a
        /// store-then-retrieve round trip byte-identically.
        #[test]
        fn prop_store_retrieve_round_trip(
            sizes in proptest::collection::vec(1usize..40_000, 1..6),
        ) {
            let env = TestEnv::new("prop_round_trip");
            let engine = ArchiveEngine::new(
                config(),
                MockSessionPool::new(8),
                env.workspace_root(),
            ).unwrap();

            let payloads: Vec<Vec<u8>> = sizes.iter().map(|&s| random_payload(s)).collect();
            let files: Vec<_> = payloads
                .iter()
                .enumerate()
                .map(|(i, p)| stage_file(&env.source_dir(), &format!("f{}.bin", i), "node", p))
                .collect();

            run(async {
                let batch = engine.prepare(files.clone(), Operation::Store);
                let sink = RecordingSink::new();
                for subset in &batch.subsets {
                    engine.store(subset, &sink).await.unwrap();
                }
                prop_assert_eq!(sink.failure_count(), 0);

                let mut retrieval = Vec::new();
                for outcome in sink.outcomes() {
                    if let nearline_core::ProgressOutcome::Stored { checksum, reference } = outcome {
                        let mut file = files
                            .iter()
                            .find(|f| f.checksum == checksum)
                            .unwrap()
                            .clone();
                        file.reference = Some(reference);
                        retrieval.push(file);
                    }
                }

                let batch = engine.prepare(retrieval, Operation::Retrieve);
                let sink = RecordingSink::new();
                for subset in &batch.subsets {
                    engine.retrieve(subset, &env.dest_dir(), &sink).await.unwrap();
                }
                prop_assert_eq!(sink.failure_count(), 0);
                Ok(())
            })?;

            for (i, payload) in payloads.iter().enumerate() {
                let restored = fs::read(env.dest_dir().join(format!("f{}.bin", i))).unwrap();
                prop_assert_eq!(&restored, payload);
            }
        }

        /// An engineered transfer failure on one file yields exactly one
        /// failed outcome; every sibling still gets its success outcome.
        #[test]
        fn prop_single_failure_isolation(
            count in 2usize..8,
            fail_index in 0usize..8,
        ) {
            let fail_index = fail_index % count;
            let env = TestEnv::new("prop_failure_isolation");
            let engine = ArchiveEngine::new(
                config(),
                MockSessionPool::new(8),
                env.workspace_root(),
            ).unwrap();

            // Sizes at or above the tar threshold store under their own
            // names, so the injected pattern hits exactly one transfer.
            let files: Vec<_> = (0..count)
                .map(|i| {
                    stage_file(
                        &env.source_dir(),
                        &format!("iso{}.bin", i),
                        "node",
                        &random_payload(6000),
                    )
                })
                .collect();
            engine
                .pool()
                .session()
                .fail_on(&format!("iso{}.bin", fail_index));

            run(async {
                let batch = engine.prepare(files, Operation::Store);
                let sink = RecordingSink::new();
                for subset in &batch.subsets {
                    engine.store(subset, &sink).await.unwrap();
                }

                prop_assert_eq!(sink.len(), count);
                prop_assert_eq!(sink.failure_count(), 1);
                prop_assert_eq!(sink.success_count(), count - 1);
                Ok(())
            })?;
        }

        /// Every input file gets exactly one outcome per store execution,
        /// no matter how the subsets were split.
        #[test]
        fn prop_exactly_one_outcome_per_file(
            count in 1usize..12,
            max_subset_size in 1u64..5,
        ) {
            let env = TestEnv::new("prop_one_outcome");
            let engine = ArchiveEngine::new(
                ArchiveConfig {
                    max_subset_size,
                    ..config()
                },
                MockSessionPool::new(8),
                env.workspace_root(),
            ).unwrap();

            let files: Vec<_> = (0..count)
                .map(|i| {
                    stage_file(
                        &env.source_dir(),
                        &format!("o{}.bin", i),
                        "node",
                        &random_payload(100 + i * 37),
                    )
                })
                .collect();
            let expected: HashSet<String> = files.iter().map(|f| f.checksum.clone()).collect();

            run(async {
                let batch = engine.prepare(files, Operation::Store);
                let sink = RecordingSink::new();
                for subset in &batch.subsets {
                    engine.store(subset, &sink).await.unwrap();
                }

                let outcomes = sink.outcomes();
                prop_assert_eq!(outcomes.len(), count);
                let seen: HashSet<String> = outcomes
                    .iter()
                    .map(|o| o.checksum().to_string())
                    .collect();
                prop_assert_eq!(seen, expected);
                Ok(())
            })?;
        }
    }
}
