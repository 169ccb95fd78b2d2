use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::DateTime;
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::model::{Method, Model};
use crate::static_model::StaticClusterer;
use crate::streaming::StreamingClusterer;

const MODEL_MAGIC: [u8; 4] = [b'C', b'L', b'S', b'T'];
const MODEL_VERSION: u32 = 1;

const METHOD_STATIC: u8 = 0;
const METHOD_STREAMING: u8 = 1;

/// Bytes before the centroid block.
const HEADER_LEN: u64 = 4 + 4 + 1 + 4 + 4 + 8;

/// Serializes a model in a compact, self-describing binary format:
///
/// ```text
/// [4B magic "CLST"] [4B version=1]
/// [1B method: 0=static, 1=streaming]
/// [4B feature_dim] [4B n_clusters]
/// [8B last_updated, unix millis as i64]
/// [n_clusters x feature_dim x 8B f64 centroids]
/// Streaming only:
///   [n_clusters x 8B u64 sample counts]
/// ```
///
/// All multi-byte values are little-endian.
pub fn save(model: &Model, w: &mut dyn Write) -> Result<(), ClusterError> {
    let mut bw = BufWriter::new(w);
    let write_err = |e: io::Error| ClusterError::Io(e.to_string());

    bw.write_all(&MODEL_MAGIC).map_err(write_err)?;
    bw.write_all(&MODEL_VERSION.to_le_bytes()).map_err(write_err)?;

    let tag = match model.method() {
        Method::Static => METHOD_STATIC,
        Method::Streaming => METHOD_STREAMING,
    };
    bw.write_all(&[tag]).map_err(write_err)?;
    bw.write_all(&(model.feature_dim() as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&(model.n_clusters() as u32).to_le_bytes()).map_err(write_err)?;
    bw.write_all(&model.last_updated().timestamp_millis().to_le_bytes())
        .map_err(write_err)?;

    for centroid in model.centroids() {
        for &v in centroid {
            bw.write_all(&v.to_le_bytes()).map_err(write_err)?;
        }
    }

    if let Some(counts) = model.sample_counts() {
        for &c in counts {
            bw.write_all(&c.to_le_bytes()).map_err(write_err)?;
        }
    }

    bw.flush().map_err(write_err)?;
    Ok(())
}

/// Deserializes a model written by [`save`].
///
/// Every header field is checked before centroid data is trusted; any
/// inconsistency, truncation or trailing data yields
/// [`ClusterError::CorruptModel`].
pub fn load(r: &mut dyn Read) -> Result<Model, ClusterError> {
    let mut br = BufReader::new(r);

    let mut magic = [0u8; 4];
    read_exact(&mut br, &mut magic)?;
    if magic != MODEL_MAGIC {
        return Err(ClusterError::CorruptModel(format!("invalid magic {magic:?}")));
    }

    let version = read_u32(&mut br)?;
    if version != MODEL_VERSION {
        return Err(ClusterError::CorruptModel(format!(
            "unsupported version {version} (want {MODEL_VERSION})"
        )));
    }

    let mut tag = [0u8; 1];
    read_exact(&mut br, &mut tag)?;
    let method = match tag[0] {
        METHOD_STATIC => Method::Static,
        METHOD_STREAMING => Method::Streaming,
        other => {
            return Err(ClusterError::CorruptModel(format!(
                "unknown method tag {other}"
            )));
        }
    };

    let feature_dim = read_u32(&mut br)? as usize;
    let n_clusters = read_u32(&mut br)? as usize;
    if feature_dim == 0 || n_clusters == 0 {
        return Err(ClusterError::CorruptModel(format!(
            "invalid dimensions: feature_dim={feature_dim}, n_clusters={n_clusters}"
        )));
    }

    let mut buf8 = [0u8; 8];
    read_exact(&mut br, &mut buf8)?;
    let millis = i64::from_le_bytes(buf8);
    let last_updated = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        ClusterError::CorruptModel(format!("timestamp {millis} out of range"))
    })?;

    // Cap preallocation; a corrupt header must not trigger a huge allocation.
    let mut centroids = Vec::with_capacity(n_clusters.min(1024));
    for i in 0..n_clusters {
        let mut centroid = Vec::with_capacity(feature_dim.min(4096));
        for _ in 0..feature_dim {
            read_exact(&mut br, &mut buf8)?;
            let x = f64::from_le_bytes(buf8);
            if !x.is_finite() {
                return Err(ClusterError::CorruptModel(format!(
                    "non-finite value {x} in centroid {i}"
                )));
            }
            centroid.push(x);
        }
        centroids.push(centroid);
    }

    let model = match method {
        Method::Static => StaticClusterer::with_timestamp(centroids, last_updated)
            .map(Model::Static)
            .map_err(|e| ClusterError::CorruptModel(e.to_string()))?,
        Method::Streaming => {
            let mut counts = Vec::with_capacity(n_clusters.min(1024));
            for _ in 0..n_clusters {
                read_exact(&mut br, &mut buf8)?;
                counts.push(u64::from_le_bytes(buf8));
            }
            StreamingClusterer::with_timestamp(centroids, counts, last_updated)
                .map(Model::Streaming)
                .map_err(|e| ClusterError::CorruptModel(e.to_string()))?
        }
    };

    let mut extra = [0u8; 1];
    match br.read(&mut extra) {
        Ok(0) => {}
        Ok(_) => {
            return Err(ClusterError::CorruptModel(
                "trailing data after record".into(),
            ));
        }
        Err(e) => return Err(ClusterError::Io(e.to_string())),
    }

    Ok(model)
}

/// Writes the model to `path`, replacing any existing file atomically.
///
/// Parent directories are created as needed.
pub fn save_file(model: &Model, path: &Path) -> Result<(), ClusterError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| ClusterError::Io(e.to_string()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    let result = (|| -> Result<(), ClusterError> {
        let mut f = File::create(tmp).map_err(|e| ClusterError::Io(e.to_string()))?;
        save(model, &mut f)?;
        f.sync_all().map_err(|e| ClusterError::Io(e.to_string()))?;
        fs::rename(tmp, path).map_err(|e| ClusterError::Io(e.to_string()))
    })();
    if result.is_err() {
        let _ = fs::remove_file(tmp);
    }
    result?;

    info!(
        path = %path.display(),
        method = %model.method(),
        n_clusters = model.n_clusters(),
        "model saved"
    );
    Ok(())
}

/// Reads a model from `path`.
///
/// A missing path, or one that is not a regular file, is
/// [`ClusterError::NotFound`].
pub fn load_file(path: &Path) -> Result<Model, ClusterError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ClusterError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(ClusterError::Io(e.to_string())),
    };
    if !meta.is_file() {
        return Err(ClusterError::NotFound(path.to_path_buf()));
    }
    if meta.len() < HEADER_LEN {
        return Err(ClusterError::CorruptModel(format!(
            "file is {} bytes, shorter than the {HEADER_LEN}-byte header",
            meta.len()
        )));
    }

    let mut f = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ClusterError::NotFound(path.to_path_buf()),
        _ => ClusterError::Io(e.to_string()),
    })?;
    let model = load(&mut f)?;
    debug!(path = %path.display(), method = %model.method(), "model read");
    Ok(model)
}

fn read_exact(br: &mut impl Read, buf: &mut [u8]) -> Result<(), ClusterError> {
    br.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ClusterError::CorruptModel("truncated record".into()),
        _ => ClusterError::Io(e.to_string()),
    })
}

fn read_u32(br: &mut impl Read) -> Result<u32, ClusterError> {
    let mut buf = [0u8; 4];
    read_exact(br, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
