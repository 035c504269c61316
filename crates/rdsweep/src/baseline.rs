//! Classical codecs run as external tools.
//!
//! A [`ToolCodec`] describes how to call an encoder and a decoder over raw
//! luma planes. Each quality or QP point is evaluated on every image and
//! scored with the same [`DistortionMeter`] as the learned models.
//!
//! Templates are expanded with these placeholders:
//!
//! | Placeholder   | Value                                   |
//! |---------------|-----------------------------------------|
//! | `{input}`     | raw input plane                         |
//! | `{bitstream}` | compressed file written by the encoder  |
//! | `{output}`    | raw plane written by the decoder        |
//! | `{width}`     | image width                             |
//! | `{height}`    | image height                            |
//! | `{bit_depth}` | bits per sample                         |
//! | `{point}`     | quality or QP of the current point      |
//!
//! Raw planes hold one byte per sample up to 8 bits and two little-endian
//! bytes per sample above. Scratch files are removed once an image is scored.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rdsweep_core::{
    DistortionMeter, LumaImage, LumaView, LuminanceImageSet, RateDistortionPoint, Result,
    SweepError,
};

use crate::aggregate::ResultAggregator;
use crate::export::{export_row, ReconstructionSink};

/// Program and arguments with placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn render(&self, vars: &[(&str, String)]) -> (String, Vec<String>) {
        let expand = |text: &str| {
            vars.iter().fold(text.to_string(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        };
        (expand(&self.program), self.args.iter().map(|a| expand(a)).collect())
    }
}

/// An external codec evaluated over fixed points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCodec {
    /// Name used in result files and log fields.
    pub name: String,
    pub encode: CommandTemplate,
    pub decode: CommandTemplate,
    /// Quality factors or QPs, one result row each.
    pub points: Vec<i32>,
}

impl ToolCodec {
    /// JPEG2000 through OpenJPEG, points are target PSNRs in dB.
    pub fn jpeg2000() -> Self {
        Self {
            name: "jpeg2000".into(),
            encode: CommandTemplate::new(
                "opj_compress",
                &["-i", "{input}", "-o", "{bitstream}", "-q", "{point}", "-F", "{width},{height},1,{bit_depth},u@1x1"],
            ),
            decode: CommandTemplate::new("opj_decompress", &["-i", "{bitstream}", "-o", "{output}"]),
            points: (24..=40).step_by(2).collect(),
        }
    }

    /// HEVC intra through the reference software, points are QPs.
    pub fn hevc() -> Self {
        Self {
            name: "hevc".into(),
            encode: CommandTemplate::new(
                "TAppEncoder",
                &[
                    "-i", "{input}", "-b", "{bitstream}", "-wdt", "{width}", "-hgt", "{height}",
                    "--InputBitDepth={bit_depth}", "--InputChromaFormat=400", "-q", "{point}",
                    "-f", "1", "-fr", "1",
                ],
            ),
            decode: CommandTemplate::new("TAppDecoder", &["-b", "{bitstream}", "-o", "{output}", "-d", "{bit_depth}"]),
            points: vec![22, 27, 32, 37, 42, 47],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SweepError::invalid_config("baseline name is empty"));
        }
        if self.points.is_empty() {
            return Err(SweepError::invalid_config(format!(
                "baseline {} has no point",
                self.name
            )));
        }
        if self.encode.program.is_empty() || self.decode.program.is_empty() {
            return Err(SweepError::invalid_config(format!(
                "baseline {} is missing a program",
                self.name
            )));
        }
        Ok(())
    }
}

/// A point that could not be evaluated.
#[derive(Debug)]
pub struct PointFailure {
    pub point: i32,
    pub image: usize,
    pub error: SweepError,
}

/// Result of [`evaluate_baseline`]. Row `i` of the matrices is `points[i]`.
#[derive(Debug)]
pub struct BaselineReport {
    pub codec: String,
    pub points: Vec<i32>,
    pub aggregator: ResultAggregator,
    pub failures: Vec<PointFailure>,
}

/// Runs `codec` at every point over every image.
///
/// A point whose tool fails leaves its row unwritten and is reported in
/// `failures`; the remaining points are still evaluated. Reconstructions of
/// points that scored on every image go to `sink` as `<codec>/<point>`.
pub fn evaluate_baseline(
    codec: &ToolCodec,
    images: &LuminanceImageSet,
    meter: &DistortionMeter,
    workdir: &Path,
    mut sink: Option<&mut dyn ReconstructionSink>,
) -> Result<BaselineReport> {
    codec.validate()?;
    fs::create_dir_all(workdir)?;

    let mut aggregator = ResultAggregator::new(codec.points.len(), images.len());
    let mut failures = Vec::new();

    for (row, &point) in codec.points.iter().enumerate() {
        let mut staged = Vec::with_capacity(images.len());
        let mut reconstructions = Vec::new();
        let mut failed = None;
        for (index, image) in images.iter().enumerate() {
            match run_point(codec, point, index, image, meter, workdir) {
                Ok((measurement, reconstruction)) => {
                    staged.push(measurement);
                    if sink.is_some() {
                        reconstructions.push(reconstruction);
                    }
                }
                Err(error) => {
                    failed = Some(PointFailure {
                        point,
                        image: index,
                        error,
                    });
                    break;
                }
            }
        }

        if failed.is_none() {
            if let Some(sink) = sink.as_deref_mut() {
                let label = format!("{}/{}", codec.name, point);
                if let Err((image, error)) = export_row(sink, &label, &reconstructions) {
                    failed = Some(PointFailure { point, image, error });
                }
            }
        }

        match failed {
            Some(failure) => {
                warn!(
                    codec = %codec.name,
                    point,
                    image = failure.image,
                    category = failure.error.category(),
                    error = %failure.error,
                    "baseline point failed"
                );
                failures.push(failure);
            }
            None => {
                for (index, measurement) in staged.into_iter().enumerate() {
                    aggregator.record_point(row, index, measurement)?;
                }
                info!(
                    codec = %codec.name,
                    point,
                    mean_rate = ?aggregator.mean_rate(row),
                    mean_psnr = ?aggregator.mean_psnr(row),
                    "baseline point evaluated"
                );
            }
        }
    }

    Ok(BaselineReport {
        codec: codec.name.clone(),
        points: codec.points.clone(),
        aggregator,
        failures,
    })
}

fn run_point(
    codec: &ToolCodec,
    point: i32,
    index: usize,
    image: LumaView<'_>,
    meter: &DistortionMeter,
    workdir: &Path,
) -> Result<(RateDistortionPoint, LumaImage)> {
    let stem = format!("{}_{}_{}", codec.name, point, index);
    let input = workdir.join(format!("{stem}_input.raw"));
    let bitstream = workdir.join(format!("{stem}.bin"));
    let output = workdir.join(format!("{stem}_output.raw"));
    let scratch = [input.as_path(), bitstream.as_path(), output.as_path()];

    // A stale output from an earlier run must not be mistaken for this one.
    remove_scratch(&scratch)?;
    let scored = score_point(codec, point, image, meter, scratch);
    if let Err(error) = remove_scratch(&scratch) {
        warn!(
            codec = %codec.name,
            point,
            image = index,
            error = %error,
            "scratch files left behind"
        );
    }
    scored
}

fn score_point(
    codec: &ToolCodec,
    point: i32,
    image: LumaView<'_>,
    meter: &DistortionMeter,
    [input, bitstream, output]: [&Path; 3],
) -> Result<(RateDistortionPoint, LumaImage)> {
    fs::write(input, encode_raw(image))?;

    let vars = [
        ("input", path_string(input)),
        ("bitstream", path_string(bitstream)),
        ("output", path_string(output)),
        ("width", image.dims.width.to_string()),
        ("height", image.dims.height.to_string()),
        ("bit_depth", image.bit_depth.to_string()),
        ("point", point.to_string()),
    ];
    run_tool(&codec.name, point, &codec.encode, &vars)?;
    run_tool(&codec.name, point, &codec.decode, &vars)?;

    let bits = fs::metadata(bitstream)
        .map_err(|e| {
            SweepError::external_tool(&codec.name, point, None, format!("no bitstream: {e}"))
        })?
        .len()
        * 8;
    let raw = fs::read(output).map_err(|e| {
        SweepError::external_tool(&codec.name, point, None, format!("no reconstruction: {e}"))
    })?;
    let samples = decode_raw(&raw, image.bit_depth, image.samples.len()).ok_or_else(|| {
        SweepError::external_tool(
            &codec.name,
            point,
            None,
            format!(
                "reconstruction holds {} bytes for {} samples",
                raw.len(),
                image.samples.len()
            ),
        )
    })?;
    // Validates the sample range before scoring.
    let decoded = LuminanceImageSet::new(image.dims, image.bit_depth, samples)?;
    let reconstruction = decoded.image(0);

    let psnr = meter.psnr(image, reconstruction)?;
    let measured = RateDistortionPoint::new(bits as f64 / image.dims.pixels() as f64, psnr)?;
    debug!(codec = %codec.name, point, bits, psnr, "baseline image scored");
    Ok((
        measured,
        LumaImage {
            dims: reconstruction.dims,
            bit_depth: reconstruction.bit_depth,
            samples: reconstruction.samples.to_vec(),
        },
    ))
}

fn remove_scratch(paths: &[&Path]) -> io::Result<()> {
    for path in paths {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

fn run_tool(name: &str, point: i32, template: &CommandTemplate, vars: &[(&str, String)]) -> Result<()> {
    let (program, args) = template.render(vars);
    let output = Command::new(&program)
        .args(&args)
        .output()
        .map_err(|e| SweepError::external_tool(name, point, None, format!("{program}: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last = stderr.lines().last().unwrap_or("").trim().to_string();
        return Err(SweepError::external_tool(
            name,
            point,
            output.status.code(),
            format!("{program} failed: {last}"),
        ));
    }
    Ok(())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn encode_raw(image: LumaView<'_>) -> Vec<u8> {
    if image.bit_depth <= 8 {
        image.samples.iter().map(|&s| s as u8).collect()
    } else {
        image.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

fn decode_raw(raw: &[u8], bit_depth: u8, samples: usize) -> Option<Vec<u16>> {
    if bit_depth <= 8 {
        (raw.len() == samples).then(|| raw.iter().map(|&b| u16::from(b)).collect())
    } else {
        (raw.len() == 2 * samples).then(|| {
            raw.chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect()
        })
    }
}
