//! CSV files written once per amplitude-sweep step.

use std::fs::File;
use std::path::{Path, PathBuf};

use hp4195_messages::{Dbm, Trace};
use log::info;

pub const HEADER: [&str; 3] = ["Frequency", "Magnitude", "Phase"];

/// `<dir>/amplitude_sweep_<amplitude>dBm.csv`
pub fn sweep_file_path(dir: &Path, amplitude: Dbm) -> PathBuf {
    dir.join(format!("amplitude_sweep_{}dBm.csv", format_amplitude(amplitude)))
}

/// Shortest decimal form of the amplitude, with accumulation noise and
/// negative zero removed.
fn format_amplitude(amplitude: Dbm) -> String {
    let rounded = (amplitude.0 * 1e9).round() / 1e9 + 0.0;
    rounded.to_string()
}

/// Write one `Frequency,Magnitude,Phase` row per sample.
pub fn write_trace_csv(path: &Path, trace: &Trace) -> Result<(), csv::Error> {
    info!("Saving data to {}", path.display());
    let mut writer = csv::Writer::from_writer(File::create(path)?);
    writer.write_record(HEADER)?;
    for (frequency, magnitude, phase) in trace.rows() {
        writer.write_record(&[
            frequency.to_string(),
            magnitude.to_string(),
            phase.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a file produced by [`write_trace_csv`].
pub fn read_trace_csv(path: &Path) -> Result<Trace, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut frequency = Vec::new();
    let mut magnitude = Vec::new();
    let mut phase = Vec::new();

    for row in reader.deserialize::<(f64, f64, f64)>() {
        let (f, m, p) = row?;
        frequency.push(f);
        magnitude.push(m);
        phase.push(p);
    }
    // every row carried all three columns, so the lengths always agree
    Ok(Trace::new(frequency, magnitude, phase).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names() {
        let dir = Path::new("/data");
        assert_eq!(
            sweep_file_path(dir, Dbm(-10.0)),
            PathBuf::from("/data/amplitude_sweep_-10dBm.csv")
        );
        assert_eq!(
            sweep_file_path(dir, Dbm(-7.5)),
            PathBuf::from("/data/amplitude_sweep_-7.5dBm.csv")
        );
        assert_eq!(
            sweep_file_path(dir, Dbm(-0.0)),
            PathBuf::from("/data/amplitude_sweep_0dBm.csv")
        );
        assert_eq!(
            sweep_file_path(dir, Dbm(0.1 + 0.2)),
            PathBuf::from("/data/amplitude_sweep_0.3dBm.csv")
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.csv");
        let trace = Trace::new(vec![1000.0, 2000.0], vec![-10.0, -20.0], vec![0.0, 45.0]).unwrap();

        write_trace_csv(&path, &trace).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Frequency,Magnitude,Phase\n"));
        assert_eq!(read_trace_csv(&path).unwrap(), trace);
    }

    #[test]
    fn test_round_trip_keeps_full_precision() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("precise.csv");
        let trace = Trace::new(
            vec![1_012_345.678_901_234],
            vec![-3.141_592_653_589_793],
            vec![1e-300],
        )
        .unwrap();

        write_trace_csv(&path, &trace).unwrap();
        assert_eq!(read_trace_csv(&path).unwrap(), trace);
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("trace.csv");
        assert!(write_trace_csv(&path, &Trace::default()).is_err());
    }
}
