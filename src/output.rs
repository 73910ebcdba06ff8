use crate::tensor::ResultTensor;
use anyhow::{Context, Result};
use log::{info, warn};
use movement_common::{CalibrationReport, FittedParameters, MovementModel};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

/// Encoding of the calibration report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Bincode,
    MessagePack,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to JSON.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.unwrap_or("json") {
            "json" => OutputFormat::Json,
            "bincode" => OutputFormat::Bincode,
            "messagepack" => OutputFormat::MessagePack,
            other => {
                warn!("Unknown output format: {}. Using JSON instead.", other);
                OutputFormat::Json
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Bincode => "bin",
            OutputFormat::MessagePack => "msgpack",
        }
    }
}

/// Writes the full report as `<base>_<calibration>.<ext>`.
pub fn write_report(
    report: &CalibrationReport,
    base: &str,
    format: OutputFormat,
) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_{}.{}", base, report.calibration, format.extension()));
    let file = File::create(&path)
        .with_context(|| format!("creating report file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    match format {
        OutputFormat::Json => {
            serde_json::to_writer(&mut writer, report).context("serializing report to JSON")?
        }
        OutputFormat::Bincode => {
            bincode::serialize_into(&mut writer, report).context("serializing report to bincode")?
        }
        OutputFormat::MessagePack => {
            rmp_serde::encode::write(&mut writer, report)
                .context("serializing report to MessagePack")?
        }
    }
    writer.flush()?;
    info!("Calibration report saved to {}", path.display());
    Ok(path)
}

/// Writes fitted coefficients as pretty JSON to `<base>_<group>_fit.json`.
pub fn write_fitted(fit: &FittedParameters, base: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_{}_fit.json", base, fit.group()));
    let json = serde_json::to_string_pretty(fit).context("serializing fitted parameters")?;
    std::fs::write(&path, json).with_context(|| format!("writing '{}'", path.display()))?;
    info!("Fitted parameters saved to {}", path.display());
    Ok(path)
}

/// Writes a model as TOML to `<base>_model.toml`, loadable as a `[model]` section.
pub fn write_model(model: &MovementModel, base: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_model.toml", base));
    let text = toml::to_string_pretty(model).context("serializing model to TOML")?;
    std::fs::write(&path, text).with_context(|| format!("writing '{}'", path.display()))?;
    info!("Updated model saved to {}", path.display());
    Ok(path)
}

/// Writes one CSV row per grid cell: axis values, mean, std and sample count.
pub fn write_summary(tensor: &ResultTensor, base: &str, calibration: &str) -> Result<PathBuf> {
    let path = PathBuf::from(format!("{}_{}_summary.csv", base, calibration));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating summary file '{}'", path.display()))?;

    let mut header: Vec<String> = tensor.axes().iter().map(|a| a.name().to_string()).collect();
    header.extend(["mean", "std", "samples"].map(String::from));
    writer.write_record(&header)?;

    let samples = tensor.num_worlds() * tensor.trials_per_world();
    for index in tensor.grid_indices() {
        let (mean, std) = tensor.cell_mean_std(&index);
        let mut record: Vec<String> =
            tensor.cell_values(&index).iter().map(|v| format!("{}", v)).collect();
        record.push(format!("{:.6}", mean));
        record.push(format!("{:.6}", std));
        record.push(samples.to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!("Summary saved to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::Axis;
    use movement_common::{ModelKind, ParameterGroup};

    fn scratch(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("movement-calibration-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name).to_string_lossy().into_owned()
    }

    fn tensor() -> ResultTensor {
        let axes = vec![
            Axis::new("velocity", vec![0.5, 1.0]).unwrap(),
            Axis::new("niche_size", vec![0.4]).unwrap(),
        ];
        ResultTensor::from_parts(axes, 1, 2, vec![1.0, 3.0, 2.0, 2.0]).unwrap()
    }

    #[test]
    fn unknown_format_falls_back_to_json() {
        assert_eq!(OutputFormat::from_name(None), OutputFormat::Json);
        assert_eq!(OutputFormat::from_name(Some("bincode")), OutputFormat::Bincode);
        assert_eq!(OutputFormat::from_name(Some("messagepack")), OutputFormat::MessagePack);
        assert_eq!(OutputFormat::from_name(Some("yaml")), OutputFormat::Json);
    }

    #[test]
    fn json_report_reads_back() {
        let base = scratch("report");
        let report = tensor().to_report("velocity", "Heatmap Weighted Model", None);
        let path = write_report(&report, &base, OutputFormat::Json).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: CalibrationReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.shape, vec![2, 1, 1, 2]);
        assert_eq!(parsed.data, vec![1.0, 3.0, 2.0, 2.0]);
    }

    #[test]
    fn binary_reports_are_written() {
        let base = scratch("binary");
        let report = tensor().to_report("velocity", "Heatmap Weighted Model", None);
        for format in [OutputFormat::Bincode, OutputFormat::MessagePack] {
            let path = write_report(&report, &base, format).unwrap();
            assert!(std::fs::metadata(path).unwrap().len() > 0);
        }
    }

    #[test]
    fn summary_has_one_row_per_cell() {
        let base = scratch("summary");
        let path = write_summary(&tensor(), &base, "velocity").unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "velocity,niche_size,mean,std,samples");
        assert_eq!(lines[1], "0.5,0.4,2.000000,1.000000,2");
        assert_eq!(lines[2], "1,0.4,2.000000,0.000000,2");
    }

    #[test]
    fn model_round_trips_through_toml() {
        let base = scratch("model");
        let fit = FittedParameters::new(
            ParameterGroup::HomeRange,
            [("alpha", 30.0), ("exponent", 0.6)],
        );
        let model = MovementModel::new(ModelKind::ConstantBrownian).apply_fit(&fit).unwrap();
        let path = write_model(&model, &base).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let parsed: MovementModel = toml::from_str(&text).unwrap();
        assert_eq!(parsed, model);
        write_fitted(&fit, &base).unwrap();
    }
}
