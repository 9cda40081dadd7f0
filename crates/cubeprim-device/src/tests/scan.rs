use super::{Submission, random_data, reference_scan, run_primitive, test_client};
use crate::{
    ConstantIterator, LookbackMode, PrimError, ScanConfig, deterministic_inclusive_scan,
    exclusive_scan_with_config, inclusive_scan, inclusive_scan_with_config,
};
use cubeprim_common::{Maximum, Numeric, Plus};
use cubeprim_runtime::{ComputeClient, DeviceSlice, Handle};

pub use cubeprim_block::BlockScanAlgorithm;

#[macro_export]
macro_rules! testgen_scan {
    () => {
        mod scan {
            use $crate::tests::{Double2, Float2, Int2, Int4, bf16, f16};

            $crate::testgen_scan!(@group: [ty=[i8, u8, i32, u32, i64, u64], sizes=[0, 1, 10, 255, 256, 257, 1_000, 4097, 100_000]]);
            $crate::testgen_scan!(@group: [ty=[f32, f64], sizes=[1, 10, 257, 4097]]);
            $crate::testgen_scan!(@group: [ty=[Int2, Int4], sizes=[0, 1, 257, 4097, 100_000]]);
            $crate::testgen_scan!(@group: [ty=[Float2, Double2], sizes=[1, 10, 257, 4097]]);
            // Sums stay exact in 16 bit floats.
            $crate::testgen_scan!(@group: [ty=[f16], sizes=[1, 10, 100]]);
            $crate::testgen_scan!(@group: [ty=[bf16], sizes=[1, 10]]);

            #[test]
            fn test_all_ones_inclusive_scan() {
                $crate::tests::scan::test_all_ones(&$crate::tests::test_client(), 10_000);
            }

            #[test]
            fn test_all_ones_planes_of_24_units() {
                $crate::tests::scan::test_all_ones(&$crate::tests::odd_plane_client(), 10_000);
            }

            #[test]
            fn test_scan_zeros() {
                $crate::tests::scan::test_zeros($crate::tests::Submission::Immediate);
            }

            #[test]
            fn test_scan_zeros_graph() {
                $crate::tests::scan::test_zeros($crate::tests::Submission::Graph);
            }

            #[test]
            fn test_scan_across_two_partial_tiles() {
                $crate::tests::scan::test_two_tiles();
            }

            #[test]
            fn test_scan_storage_size_depends_on_size_only() {
                $crate::tests::scan::test_storage_size();
            }

            #[test]
            fn test_scan_empty_input_writes_nothing() {
                $crate::tests::scan::test_empty();
            }

            #[test]
            fn test_deterministic_scan_is_reproducible() {
                $crate::tests::scan::test_reproducible();
            }

            #[test]
            fn test_scan_errors() {
                $crate::tests::scan::test_errors();
            }

            #[test]
            fn test_scan_maximum() {
                $crate::tests::scan::test_maximum();
            }
        }
    };
    (@group: [ty=[$($ty:ty),*], sizes=$sizes:expr]) => {
        $(
            $crate::testgen_scan!(@case: $ty, $sizes, inclusive, true);
            $crate::testgen_scan!(@case: $ty, $sizes, exclusive, false);
        )*
    };
    (@case: $ty:ty, $sizes:expr, $kind:ident, $inclusive:literal) => {
        paste::paste! {
            #[test]
            fn [<test_ $kind _scan_ $ty:lower>]() {
                let client = $crate::tests::test_client();
                for size in $sizes {
                    $crate::tests::scan::ScanTestCase::new(size, $inclusive, Default::default(), $crate::tests::Submission::Immediate)
                        .test_scan::<$ty>(&client);
                }
            }

            #[test]
            fn [<test_ $kind _scan_ $ty:lower _reduce_then_scan>]() {
                let client = $crate::tests::test_client();
                let config = $crate::ScanConfig::default()
                    .with_algorithm($crate::tests::scan::BlockScanAlgorithm::ReduceThenScan);
                for size in $sizes {
                    $crate::tests::scan::ScanTestCase::new(size, $inclusive, config, $crate::tests::Submission::Immediate)
                        .test_scan::<$ty>(&client);
                }
            }

            #[test]
            fn [<test_ $kind _scan_ $ty:lower _deterministic>]() {
                let client = $crate::tests::test_client();
                let config = $crate::ScanConfig::default()
                    .with_lookback($crate::LookbackMode::Deterministic);
                for size in $sizes {
                    $crate::tests::scan::ScanTestCase::new(size, $inclusive, config, $crate::tests::Submission::Immediate)
                        .test_scan::<$ty>(&client);
                }
            }

            #[test]
            fn [<test_ $kind _scan_ $ty:lower _graph>]() {
                let client = $crate::tests::test_client();
                for size in $sizes {
                    $crate::tests::scan::ScanTestCase::new(size, $inclusive, Default::default(), $crate::tests::Submission::Graph)
                        .test_scan::<$ty>(&client);
                }
            }
        }
    };
}

#[derive(new, Debug)]
pub struct ScanTestCase {
    pub size: usize,
    pub inclusive: bool,
    pub config: ScanConfig,
    pub submission: Submission,
}

impl ScanTestCase {
    pub fn test_scan<T: Numeric>(&self, client: &ComputeClient) {
        let data = random_data::<T>(self.size, 1, 20, 1234);
        let init = (!self.inclusive).then(|| T::from_int(3));
        let expected = reference_scan(&data, init, |a, b| a.plus(b));

        let stream = client.create_stream();
        let input = client.create_slice(&data);
        let output = client.empty_slice::<T>(self.size);

        run_primitive(client, &stream, self.submission, |storage, storage_size| {
            match init {
                Some(init) => exclusive_scan_with_config(
                    storage,
                    storage_size,
                    input.clone(),
                    &output,
                    init,
                    self.size,
                    Plus,
                    &self.config,
                    &stream,
                    false,
                ),
                None => inclusive_scan_with_config(
                    storage,
                    storage_size,
                    input.clone(),
                    &output,
                    self.size,
                    Plus,
                    &self.config,
                    &stream,
                    false,
                ),
            }
        })
        .unwrap();

        let actual = stream.read_slice(&output).unwrap();
        assert_eq!(actual, expected, "Scan of {} items with {:?}", self.size, self);
    }
}

pub fn test_all_ones(client: &ComputeClient, size: usize) {
    let stream = client.create_stream();
    let output = client.empty_slice::<u64>(size);

    run_primitive(client, &stream, Submission::Immediate, |storage, storage_size| {
        inclusive_scan(
            storage,
            storage_size,
            ConstantIterator::new(1u64),
            &output,
            size,
            Plus,
            &stream,
            false,
        )
    })
    .unwrap();

    let actual = stream.read_slice(&output).unwrap();
    for (index, value) in actual.into_iter().enumerate() {
        assert_eq!(value, index as u64 + 1, "Item {index}");
    }
}

/// Zeros scan to `init` when exclusive and to zero when inclusive.
pub fn test_zeros(submission: Submission) {
    let client = test_client();
    let stream = client.create_stream();
    let size = 5_000;
    let output = client.create_slice(&vec![9i64; size]);
    let small_tiles =
        ScanConfig::new(64, 2, BlockScanAlgorithm::ReduceThenScan, LookbackMode::Decoupled);

    for config in [ScanConfig::default(), small_tiles] {
        run_primitive(&client, &stream, submission, |storage, storage_size| {
            exclusive_scan_with_config(
                storage,
                storage_size,
                ConstantIterator::new(0i64),
                &output,
                -4,
                size,
                Plus,
                &config,
                &stream,
                false,
            )
        })
        .unwrap();
        assert_eq!(stream.read_slice(&output).unwrap(), vec![-4; size], "{config:?}");

        run_primitive(&client, &stream, submission, |storage, storage_size| {
            inclusive_scan_with_config(
                storage,
                storage_size,
                ConstantIterator::new(0i64),
                &output,
                size,
                Plus,
                &config,
                &stream,
                false,
            )
        })
        .unwrap();
        assert_eq!(stream.read_slice(&output).unwrap(), vec![0; size], "{config:?}");
    }
}

/// 257 items over tiles of 256: one full tile and a partial one of a single item.
pub fn test_two_tiles() {
    let client = test_client();
    let config = ScanConfig::new(64, 4, BlockScanAlgorithm::WarpScan, LookbackMode::Decoupled);
    assert_eq!(config.tile_size(), 256);

    for inclusive in [true, false] {
        ScanTestCase::new(257, inclusive, config, Submission::Immediate).test_scan::<i32>(&client);
    }
}

pub fn test_storage_size() {
    let client = test_client();
    let stream = client.create_stream();
    let output = client.empty_slice::<u32>(10_000);

    let query = |size: usize, value: u32| {
        let mut storage_size = 0;
        inclusive_scan(
            None,
            &mut storage_size,
            ConstantIterator::new(value),
            &output,
            size,
            Plus,
            &stream,
            false,
        )
        .unwrap();
        storage_size
    };

    assert_eq!(query(10_000, 1), query(10_000, 7));
    assert_eq!(query(10_000, 1), query(10_000, 1));
    assert!(query(10_000, 1) >= query(10, 1));
    assert!(query(0, 1) >= crate::MIN_TEMP_STORAGE_SIZE);
}

pub fn test_empty() {
    let client = test_client();
    let stream = client.create_stream();
    let output = client.create_slice(&[7i32; 4]);

    run_primitive(&client, &stream, Submission::Immediate, |storage, storage_size| {
        inclusive_scan(
            storage,
            storage_size,
            ConstantIterator::new(1i32),
            &output,
            0,
            Plus,
            &stream,
            true,
        )
    })
    .unwrap();

    assert_eq!(stream.read_slice(&output).unwrap(), vec![7; 4]);
}

/// Float sums depend on their grouping, which must not depend on the schedule.
pub fn test_reproducible() {
    let client = test_client();
    let data: Vec<f32> = (0..50_000).map(|index| 1.0 / (1 + index % 97) as f32).collect();
    let config = ScanConfig::default().with_lookback(LookbackMode::Deterministic);

    let run = || {
        let stream = client.create_stream();
        let input = client.create_slice(&data);
        let output = client.empty_slice::<f32>(data.len());
        run_primitive(&client, &stream, Submission::Immediate, |storage, storage_size| {
            inclusive_scan_with_config(
                storage,
                storage_size,
                input.clone(),
                &output,
                data.len(),
                Plus,
                &config,
                &stream,
                false,
            )
        })
        .unwrap();
        stream
            .read_slice(&output)
            .unwrap()
            .into_iter()
            .map(f32::to_bits)
            .collect::<Vec<_>>()
    };

    let first = run();
    for _ in 0..3 {
        assert_eq!(run(), first);
    }

    let stream = client.create_stream();
    let input = client.create_slice(&data);
    let output = client.empty_slice::<f32>(data.len());
    run_primitive(&client, &stream, Submission::Graph, |storage, storage_size| {
        deterministic_inclusive_scan(
            storage,
            storage_size,
            input.clone(),
            &output,
            data.len(),
            Plus,
            &stream,
            false,
        )
    })
    .unwrap();
    let bits: Vec<u32> = stream
        .read_slice(&output)
        .unwrap()
        .into_iter()
        .map(f32::to_bits)
        .collect();
    assert_eq!(bits, first);
}

pub fn test_errors() {
    let client = test_client();
    let stream = client.create_stream();
    let output = client.empty_slice::<u32>(1000);

    let mut storage_size = 0;
    let scan = |storage: Option<&Handle>,
                storage_size: &mut usize,
                output: &DeviceSlice<u32>,
                size: usize| {
        inclusive_scan(
            storage,
            storage_size,
            ConstantIterator::new(1u32),
            output,
            size,
            Plus,
            &stream,
            false,
        )
    };

    scan(None, &mut storage_size, &output, 1000).unwrap();
    let small = client.empty(storage_size - 1);
    assert!(matches!(
        scan(Some(&small), &mut storage_size, &output, 1000),
        Err(PrimError::AllocationFailure { .. })
    ));

    let short = client.empty_slice::<u32>(10);
    assert!(matches!(
        scan(None, &mut storage_size, &short, 1000),
        Err(PrimError::InvalidConfiguration { .. })
    ));

    let config = ScanConfig::new(0, 4, BlockScanAlgorithm::WarpScan, LookbackMode::Decoupled);
    assert!(matches!(
        inclusive_scan_with_config(
            None,
            &mut storage_size,
            ConstantIterator::new(1u32),
            &output,
            1000,
            Plus,
            &config,
            &stream,
            false,
        ),
        Err(PrimError::InvalidConfiguration { .. })
    ));
}

pub fn test_maximum() {
    let client = test_client();
    let stream = client.create_stream();
    let data = random_data::<i32>(5000, -1000, 1000, 42);
    let input = client.create_slice(&data);
    let output = client.empty_slice::<i32>(data.len());

    run_primitive(&client, &stream, Submission::Graph, |storage, storage_size| {
        inclusive_scan(
            storage,
            storage_size,
            input.clone(),
            &output,
            data.len(),
            Maximum,
            &stream,
            true,
        )
    })
    .unwrap();

    let expected = reference_scan(&data, None, |a: i32, b: i32| a.max(b));
    assert_eq!(stream.read_slice(&output).unwrap(), expected);
}
