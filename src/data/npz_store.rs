/// NumPy store for segmented signal windows (.npz archive + .npy exclusion mask)
use ndarray::{Array1, Array3, ArrayView2, Axis, Ix1, Ix3, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpyExt, ReadableElement, WriteNpyExt};
use std::fmt::Display;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Parallel arrays of windows, class labels and domain indices
#[derive(Debug, Clone)]
pub struct RawSignals {
    windows: Array3<f32>, // [N, channels, length]
    labels: Array1<i64>,  // [N]
    domains: Array1<i64>, // [N]
}

impl RawSignals {
    /// Wrap already-loaded arrays, checking they are parallel
    pub fn new(windows: Array3<f32>, labels: Array1<i64>, domains: Array1<i64>) -> crate::Result<Self> {
        let n = windows.len_of(Axis(0));
        if labels.len() != n || domains.len() != n {
            return Err(crate::DataError::Config(format!(
                "Length mismatch: windows {} vs labels {} vs domains {}",
                n,
                labels.len(),
                domains.len()
            )));
        }

        Ok(Self {
            windows,
            labels,
            domains,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `[channels, length]` of a single window
    pub fn window_shape(&self) -> (usize, usize) {
        let (_, c, l) = self.windows.dim();
        (c, l)
    }

    pub fn windows(&self) -> &Array3<f32> {
        &self.windows
    }

    pub fn window(&self, idx: usize) -> ArrayView2<f32> {
        self.windows.index_axis(Axis(0), idx)
    }

    pub fn labels(&self) -> &Array1<i64> {
        &self.labels
    }

    pub fn domains(&self) -> &Array1<i64> {
        &self.domains
    }

    /// Keep rows for which `keep(label, domain, row)` holds, preserving order
    pub fn filter<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(i64, i64, usize) -> bool,
    {
        let indices: Vec<usize> = (0..self.len())
            .filter(|&i| keep(self.labels[i], self.domains[i], i))
            .collect();

        Self {
            windows: self.windows.select(Axis(0), &indices),
            labels: self.labels.select(Axis(0), &indices),
            domains: self.domains.select(Axis(0), &indices),
        }
    }
}

/// Loader/writer for the on-disk dataset format
pub struct SignalStore;

impl SignalStore {
    /// Load `x`, `y`, `k` from a `.npz` archive
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<RawSignals> {
        let path = path.as_ref();

        log::info!("Loading signal archive from: {:?}", path);

        let file = File::open(path)?;
        let mut npz = NpzReader::new(file).map_err(|e| invalid_data(path, "archive", e))?;
        let names = npz.names().map_err(|e| invalid_data(path, "archive", e))?;

        let x_name = entry_name(&names, "x", path)?;
        let y_name = entry_name(&names, "y", path)?;
        let k_name = entry_name(&names, "k", path)?;

        // Windows may be saved as float64
        let windows = match npz.by_name::<OwnedRepr<f32>, Ix3>(&x_name) {
            Ok(x) => x,
            Err(_) => npz
                .by_name::<OwnedRepr<f64>, Ix3>(&x_name)
                .map_err(|e| invalid_data(path, "x", e))?
                .mapv(|v| v as f32),
        };
        let labels = read_index_entry(&mut npz, &y_name, path)?;
        let domains = read_index_entry(&mut npz, &k_name, path)?;

        let signals = RawSignals::new(windows, labels, domains)?;

        log::info!(
            "Loaded {} windows, shape {:?}",
            signals.len(),
            signals.windows().shape()
        );

        Ok(signals)
    }

    /// Load the exclusion mask; `true` marks a sample to leave out of evaluation.
    ///
    /// Boolean and integer arrays are accepted; a non-zero integer excludes.
    pub fn load_mask<P: AsRef<Path>>(path: P) -> crate::Result<Array1<bool>> {
        let path = path.as_ref();

        let readers: [fn(&Path) -> crate::Result<Option<Array1<bool>>>; 9] = [
            read_mask_as::<bool>,
            read_mask_as::<i64>,
            read_mask_as::<i32>,
            read_mask_as::<i16>,
            read_mask_as::<i8>,
            read_mask_as::<u64>,
            read_mask_as::<u32>,
            read_mask_as::<u16>,
            read_mask_as::<u8>,
        ];
        for read in readers {
            if let Some(mask) = read(path)? {
                return Ok(mask);
            }
        }

        Err(invalid_data(path, "mask", "expected a 1-D bool or integer array"))
    }

    /// Write signals in the format `load` reads
    pub fn save_npz<P: AsRef<Path>>(path: P, signals: &RawSignals) -> crate::Result<()> {
        let path = path.as_ref();
        let mut npz = NpzWriter::new(BufWriter::new(File::create(path)?));

        npz.add_array("x", signals.windows())
            .map_err(|e| invalid_data(path, "x", e))?;
        npz.add_array("y", signals.labels())
            .map_err(|e| invalid_data(path, "y", e))?;
        npz.add_array("k", signals.domains())
            .map_err(|e| invalid_data(path, "k", e))?;
        npz.finish().map_err(|e| invalid_data(path, "archive", e))?;

        Ok(())
    }

    /// Write an exclusion mask as a boolean `.npy`
    pub fn save_mask<P: AsRef<Path>>(path: P, mask: &Array1<bool>) -> crate::Result<()> {
        let path = path.as_ref();
        mask.write_npy(BufWriter::new(File::create(path)?))
            .map_err(|e| invalid_data(path, "mask", e))
    }
}

/// `None` when the file holds a different dtype
fn read_mask_as<T>(path: &Path) -> crate::Result<Option<Array1<bool>>>
where
    T: ReadableElement + Clone + Default + PartialEq,
{
    let file = File::open(path)?;
    Ok(Array1::<T>::read_npy(file)
        .ok()
        .map(|mask| mask.mapv(|v| v != T::default())))
}

fn read_index_entry(
    npz: &mut NpzReader<File>,
    name: &str,
    path: &Path,
) -> crate::Result<Array1<i64>> {
    match npz.by_name::<OwnedRepr<i64>, Ix1>(name) {
        Ok(a) => Ok(a),
        Err(_) => Ok(npz
            .by_name::<OwnedRepr<i32>, Ix1>(name)
            .map_err(|e| invalid_data(path, name, e))?
            .mapv(i64::from)),
    }
}

fn entry_name(names: &[String], key: &str, path: &Path) -> crate::Result<String> {
    names
        .iter()
        .find(|n| n.as_str() == key || n.strip_suffix(".npy") == Some(key))
        .cloned()
        .ok_or_else(|| invalid_data(path, key, "entry not found"))
}

fn invalid_data(path: &Path, what: &str, err: impl Display) -> crate::DataError {
    crate::DataError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("Failed to read '{}' from {:?}: {}", what, path, err),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array};

    fn toy_signals() -> RawSignals {
        let windows = Array::from_shape_fn((4, 2, 3), |(n, c, l)| (n * 100 + c * 10 + l) as f32);
        RawSignals::new(windows, arr1(&[0, 1, 0, 1]), arr1(&[0, 0, 5, 5])).unwrap()
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let windows = Array3::<f32>::zeros((3, 1, 4));
        let result = RawSignals::new(windows, arr1(&[0, 1]), arr1(&[0, 0, 0]));
        assert!(matches!(result, Err(crate::DataError::Config(_))));
    }

    #[test]
    fn test_filter_keeps_order() {
        let signals = toy_signals();
        let train = signals.filter(|_, k, _| k < 4);

        assert_eq!(train.len(), 2);
        assert_eq!(train.window_shape(), (2, 3));
        assert_eq!(train.window(1)[[1, 2]], 112.0);
        assert_eq!(train.labels().to_vec(), vec![0, 1]);
    }

    #[test]
    fn test_npz_and_mask_files() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let data_path = dir.path().join("toy.npz");
        let mask_path = dir.path().join("toy_fs.npy");

        SignalStore::save_npz(&data_path, &toy_signals())?;
        SignalStore::save_mask(&mask_path, &arr1(&[false, true, false, false]))?;

        let loaded = SignalStore::load(&data_path)?;
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.window(3)[[0, 1]], 301.0);
        assert_eq!(loaded.domains().to_vec(), vec![0, 0, 5, 5]);

        let mask = SignalStore::load_mask(&mask_path)?;
        assert_eq!(mask.to_vec(), vec![false, true, false, false]);

        Ok(())
    }

    #[test]
    fn test_integer_masks_nonzero_excludes() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let i32_path = dir.path().join("mask_i32.npy");
        arr1(&[0i32, 1, 0, 7])
            .write_npy(File::create(&i32_path)?)
            .map_err(|e| invalid_data(&i32_path, "mask", e))?;
        let mask = SignalStore::load_mask(&i32_path)?;
        assert_eq!(mask.to_vec(), vec![false, true, false, true]);

        let i64_path = dir.path().join("mask_i64.npy");
        arr1(&[1i64, 0, 0])
            .write_npy(File::create(&i64_path)?)
            .map_err(|e| invalid_data(&i64_path, "mask", e))?;
        let mask = SignalStore::load_mask(&i64_path)?;
        assert_eq!(mask.to_vec(), vec![true, false, false]);

        let u8_path = dir.path().join("mask_u8.npy");
        arr1(&[0u8, 0, 1])
            .write_npy(File::create(&u8_path)?)
            .map_err(|e| invalid_data(&u8_path, "mask", e))?;
        assert_eq!(SignalStore::load_mask(&u8_path)?.to_vec(), vec![false, false, true]);

        Ok(())
    }

    #[test]
    fn test_float_mask_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mask_f32.npy");
        arr1(&[0.0f32, 1.0])
            .write_npy(File::create(&path)?)
            .map_err(|e| invalid_data(&path, "mask", e))?;

        let err = SignalStore::load_mask(&path).unwrap_err();
        assert!(err.to_string().contains("mask_f32.npy"));

        Ok(())
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let result = SignalStore::load("does/not/exist.npz");
        assert!(matches!(result, Err(crate::DataError::Io(_))));
    }

    #[test]
    fn test_corrupt_archive_is_fatal() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.npz");
        std::fs::write(&path, b"not a zip archive")?;

        let err = SignalStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.npz"));

        Ok(())
    }
}
