use super::{Submission, random_data, run_primitive, test_client};
use crate::{
    MergeSortConfig, PrimError, merge_sort_keys, merge_sort_keys_with_config, merge_sort_pairs,
    merge_sort_pairs_with_config,
};
use cubeprim_common::{Greater, Less, Numeric};
use cubeprim_runtime::ComputeClient;

#[macro_export]
macro_rules! testgen_merge_sort {
    () => {
        mod merge_sort {
            use $crate::tests::{Float2, Int4, bf16, f16};

            $crate::testgen_merge_sort!(@group: [ty=[i8, u16, i32, u32, i64, f32, f64], sizes=[0, 1, 10, 127, 128, 129, 1023, 1024, 1025, 5_000, 70_000]]);
            $crate::testgen_merge_sort!(@group: [ty=[f16, bf16, Float2, Int4], sizes=[0, 1, 129, 1025, 5_000]]);

            #[test]
            fn test_merge_sort_is_stable() {
                $crate::tests::merge_sort::test_equal_keys_keep_order();
            }

            #[test]
            fn test_merge_sort_pairs_many_duplicates() {
                $crate::tests::merge_sort::test_pairs_stability(&$crate::tests::test_client(), 50_000);
            }

            #[test]
            fn test_merge_sort_sorted_input_is_unchanged() {
                $crate::tests::merge_sort::test_sorted_input($crate::tests::Submission::Immediate);
            }

            #[test]
            fn test_merge_sort_sorted_input_is_unchanged_graph() {
                $crate::tests::merge_sort::test_sorted_input($crate::tests::Submission::Graph);
            }

            #[test]
            fn test_merge_sort_in_place() {
                $crate::tests::merge_sort::test_in_place();
            }

            #[test]
            fn test_merge_sort_descending() {
                $crate::tests::merge_sort::test_descending();
            }

            #[test]
            fn test_merge_sort_errors() {
                $crate::tests::merge_sort::test_errors();
            }
        }
    };
    (@group: [ty=[$($ty:ty),*], sizes=$sizes:expr]) => {
        $(
            paste::paste! {
                #[test]
                fn [<test_merge_sort_keys_ $ty:lower>]() {
                    let client = $crate::tests::test_client();
                    for size in $sizes {
                        $crate::tests::merge_sort::SortTestCase::new(size, Default::default(), $crate::tests::Submission::Immediate)
                            .test_sort_keys::<$ty>(&client);
                    }
                }

                #[test]
                fn [<test_merge_sort_keys_ $ty:lower _small_tiles>]() {
                    let client = $crate::tests::test_client();
                    for size in $sizes {
                        $crate::tests::merge_sort::SortTestCase::new(size, $crate::tests::merge_sort::small_tiles(), $crate::tests::Submission::Immediate)
                            .test_sort_keys::<$ty>(&client);
                    }
                }

                #[test]
                fn [<test_merge_sort_keys_ $ty:lower _graph>]() {
                    let client = $crate::tests::test_client();
                    for size in $sizes {
                        $crate::tests::merge_sort::SortTestCase::new(size, $crate::tests::merge_sort::small_tiles(), $crate::tests::Submission::Graph)
                            .test_sort_keys::<$ty>(&client);
                    }
                }

                #[test]
                fn [<test_merge_sort_pairs_ $ty:lower>]() {
                    let client = $crate::tests::test_client();
                    for size in $sizes {
                        $crate::tests::merge_sort::SortTestCase::new(size, $crate::tests::merge_sort::small_tiles(), $crate::tests::Submission::Immediate)
                            .test_sort_pairs::<$ty>(&client);
                    }
                }
            }
        )*
    };
}

/// Sort tiles of 128 items merged by tiles of 64, so that small inputs need several merge
/// passes.
pub fn small_tiles() -> MergeSortConfig {
    MergeSortConfig::new(64, 2, 32, 2, 32)
}

#[derive(new, Debug)]
pub struct SortTestCase {
    pub size: usize,
    pub config: MergeSortConfig,
    pub submission: Submission,
}

impl SortTestCase {
    pub fn test_sort_keys<K: Numeric>(&self, client: &ComputeClient) {
        let keys = random_data::<K>(self.size, -100, 100, 4321);
        let mut expected = keys.clone();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let stream = client.create_stream();
        let input = client.create_slice(&keys);
        let output = client.empty_slice::<K>(self.size);

        run_primitive(client, &stream, self.submission, |storage, storage_size| {
            merge_sort_keys_with_config(
                storage,
                storage_size,
                input.clone(),
                &output,
                self.size,
                Less,
                &self.config,
                &stream,
                false,
            )
        })
        .unwrap();

        assert_eq!(
            stream.read_slice(&output).unwrap(),
            expected,
            "Sort of {} keys with {:?}",
            self.size,
            self
        );
    }

    /// Values are the original positions, so their order checks stability too.
    pub fn test_sort_pairs<K: Numeric>(&self, client: &ComputeClient) {
        let keys = random_data::<K>(self.size, 0, 16, 8765);
        let values: Vec<u32> = (0..self.size as u32).collect();
        let mut expected: Vec<(K, u32)> = keys.iter().copied().zip(values.iter().copied()).collect();
        expected.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let stream = client.create_stream();
        let keys_input = client.create_slice(&keys);
        let values_input = client.create_slice(&values);
        let keys_output = client.empty_slice::<K>(self.size);
        let values_output = client.empty_slice::<u32>(self.size);

        run_primitive(client, &stream, self.submission, |storage, storage_size| {
            merge_sort_pairs_with_config(
                storage,
                storage_size,
                keys_input.clone(),
                &keys_output,
                values_input.clone(),
                &values_output,
                self.size,
                Less,
                &self.config,
                &stream,
                false,
            )
        })
        .unwrap();

        let actual_keys = stream.read_slice(&keys_output).unwrap();
        let actual_values = stream.read_slice(&values_output).unwrap();
        let actual: Vec<(K, u32)> = actual_keys.into_iter().zip(actual_values).collect();
        assert_eq!(actual, expected, "Sort of {} pairs with {:?}", self.size, self);
    }
}

pub fn test_equal_keys_keep_order() {
    let client = test_client();
    let stream = client.create_stream();
    let keys = client.create_slice(&[1i32, 1, 1]);
    let values = client.create_slice(&[0u32, 1, 2]);
    let keys_output = client.empty_slice::<i32>(3);
    let values_output = client.empty_slice::<u32>(3);

    run_primitive(&client, &stream, Submission::Immediate, |storage, storage_size| {
        merge_sort_pairs(
            storage,
            storage_size,
            keys.clone(),
            &keys_output,
            values.clone(),
            &values_output,
            3,
            Less,
            &stream,
            true,
        )
    })
    .unwrap();

    assert_eq!(stream.read_slice(&keys_output).unwrap(), vec![1, 1, 1]);
    assert_eq!(stream.read_slice(&values_output).unwrap(), vec![0, 1, 2]);
}

pub fn test_pairs_stability(client: &ComputeClient, size: usize) {
    SortTestCase::new(size, MergeSortConfig::default(), Submission::Immediate)
        .test_sort_pairs::<u8>(client);
    SortTestCase::new(size, small_tiles(), Submission::Graph).test_sort_pairs::<i64>(client);
}

/// Sorting a sorted sequence keeps every key and, ties being stable, every value in place.
pub fn test_sorted_input(submission: Submission) {
    let client = test_client();
    let stream = client.create_stream();
    let mut data = random_data::<i32>(10_000, -300, 300, 13);
    data.sort();
    let values: Vec<u32> = (0..data.len() as u32).collect();

    let keys_input = client.create_slice(&data);
    let values_input = client.create_slice(&values);
    let keys_output = client.empty_slice::<i32>(data.len());
    let values_output = client.empty_slice::<u32>(data.len());

    for config in [MergeSortConfig::default(), small_tiles()] {
        run_primitive(&client, &stream, submission, |storage, storage_size| {
            merge_sort_pairs_with_config(
                storage,
                storage_size,
                keys_input.clone(),
                &keys_output,
                values_input.clone(),
                &values_output,
                data.len(),
                Less,
                &config,
                &stream,
                false,
            )
        })
        .unwrap();

        assert_eq!(stream.read_slice(&keys_output).unwrap(), data, "{config:?}");
        assert_eq!(stream.read_slice(&values_output).unwrap(), values, "{config:?}");
    }

    run_primitive(&client, &stream, submission, |storage, storage_size| {
        merge_sort_keys(
            storage,
            storage_size,
            keys_input.clone(),
            &keys_input,
            data.len(),
            Less,
            &stream,
            false,
        )
    })
    .unwrap();
    assert_eq!(stream.read_slice(&keys_input).unwrap(), data);
}

pub fn test_in_place() {
    let client = test_client();
    let stream = client.create_stream();
    let data = random_data::<i32>(10_000, -5000, 5000, 11);
    let keys = client.create_slice(&data);

    run_primitive(&client, &stream, Submission::Immediate, |storage, storage_size| {
        merge_sort_keys_with_config(
            storage,
            storage_size,
            keys.clone(),
            &keys,
            data.len(),
            Less,
            &small_tiles(),
            &stream,
            false,
        )
    })
    .unwrap();

    let mut expected = data.clone();
    expected.sort();
    assert_eq!(stream.read_slice(&keys).unwrap(), expected);
}

pub fn test_descending() {
    let client = test_client();
    let stream = client.create_stream();
    let data = random_data::<u64>(3000, 0, 1_000_000, 12);
    let input = client.create_slice(&data);
    let output = client.empty_slice::<u64>(data.len());

    run_primitive(&client, &stream, Submission::Immediate, |storage, storage_size| {
        merge_sort_keys(
            storage,
            storage_size,
            input.clone(),
            &output,
            data.len(),
            Greater,
            &stream,
            false,
        )
    })
    .unwrap();

    let mut expected = data.clone();
    expected.sort_by(|a, b| b.cmp(a));
    assert_eq!(stream.read_slice(&output).unwrap(), expected);
}

pub fn test_errors() {
    let client = test_client();
    let stream = client.create_stream();
    let keys = client.create_slice(&[3u32, 2, 1]);
    let short = client.empty_slice::<u32>(2);
    let mut storage_size = 0;

    assert!(matches!(
        merge_sort_keys(
            None,
            &mut storage_size,
            keys.clone(),
            &short,
            3,
            Less,
            &stream,
            false,
        ),
        Err(PrimError::InvalidConfiguration { .. })
    ));

    // 128 items per sort tile can't be split into merge tiles of 96.
    assert!(matches!(
        merge_sort_keys_with_config(
            None,
            &mut storage_size,
            keys.clone(),
            &keys,
            3,
            Less,
            &MergeSortConfig::new(64, 2, 32, 3, 32),
            &stream,
            false,
        ),
        Err(PrimError::InvalidConfiguration { .. })
    ));
}
