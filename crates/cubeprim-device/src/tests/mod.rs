use crate::PrimError;
use cubeprim_common::Numeric;
use cubeprim_runtime::{ComputeClient, DeviceProperties, Handle, Stream};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Element types named by the generated tests.
pub use cubeprim_common::{Double2, Float2, Int2, Int4, bf16, f16};

pub mod merge_sort;
pub mod scan;

#[macro_export]
macro_rules! testgen_all {
    () => {
        $crate::testgen_scan!();
        $crate::testgen_reduce!();
        $crate::testgen_merge_sort!();
        $crate::testgen_segmented!();
        $crate::testgen_search!();
        $crate::testgen_large_index!();
    };
}

/// How a primitive is submitted to its stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// Kernels are enqueued directly.
    Immediate,
    /// Kernels are captured into a graph, which is then launched.
    Graph,
}

pub fn test_properties() -> DeviceProperties {
    DeviceProperties {
        plane_dim: 32,
        max_units_per_cube: 1024,
        max_shared_memory_size: 64 * 1024,
        max_cube_count: (65_535, 65_535, 65_535),
        num_workers: 4,
    }
}

pub fn test_client() -> ComputeClient {
    ComputeClient::new(test_properties())
}

/// A client whose planes hold 24 units, so that plane boundaries aren't powers of two.
pub fn odd_plane_client() -> ComputeClient {
    ComputeClient::new(DeviceProperties {
        plane_dim: 24,
        ..test_properties()
    })
}

/// A client splitting grids of more than 8 cubes into several launches.
pub fn large_index_client() -> ComputeClient {
    ComputeClient::new(DeviceProperties {
        max_cube_count: (2, 2, 2),
        ..test_properties()
    })
}

/// Queries the temporary storage of a primitive, runs it with a fresh allocation and waits
/// for it.
pub fn run_primitive<F>(
    client: &ComputeClient,
    stream: &Stream,
    submission: Submission,
    mut primitive: F,
) -> Result<(), PrimError>
where
    F: FnMut(Option<&Handle>, &mut usize) -> Result<(), PrimError>,
{
    let mut storage_size = 0;
    primitive(None, &mut storage_size)?;
    let storage = client.empty(storage_size);

    match submission {
        Submission::Immediate => primitive(Some(&storage), &mut storage_size)?,
        Submission::Graph => {
            stream.begin_capture()?;
            let result = primitive(Some(&storage), &mut storage_size);
            let graph = stream.end_capture()?;
            result?;
            graph.launch(stream)?;
        }
    }

    stream.sync()?;
    Ok(())
}

/// `len` values drawn uniformly from `low..high`.
pub fn random_data<T: Numeric>(len: usize, low: i64, high: i64, seed: u64) -> Vec<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| T::from_int(rng.random_range(low..high)))
        .collect()
}

/// Scan computed on the host, exclusive when `init` is set.
pub fn reference_scan<T: Copy>(data: &[T], init: Option<T>, op: impl Fn(T, T) -> T) -> Vec<T> {
    match init {
        Some(init) => data
            .iter()
            .scan(init, |acc, &value| {
                let previous = *acc;
                *acc = op(*acc, value);
                Some(previous)
            })
            .collect(),
        None => data
            .iter()
            .scan(None, |acc: &mut Option<T>, &value| {
                let next = acc.map_or(value, |acc| op(acc, value));
                *acc = Some(next);
                Some(next)
            })
            .collect(),
    }
}

/// Random segment bounds over `size` items, with empty segments and gaps between some of them.
pub fn random_segments(size: usize, seed: u64) -> (Vec<u64>, Vec<u64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let (mut begins, mut ends) = (Vec::new(), Vec::new());
    let mut position = 0;

    while position < size {
        if rng.random_range(0..4) == 0 {
            position += rng.random_range(0..8);
        }
        let begin = position.min(size);
        let len = match rng.random_range(0..6) {
            0 => 0,
            1 => rng.random_range(1000..3000),
            _ => rng.random_range(1..300),
        };
        let end = (begin + len).min(size);
        begins.push(begin as u64);
        ends.push(end as u64);
        position = end.max(begin + 1);
    }

    (begins, ends)
}
