use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead},
    path::Path,
};

static METADATA_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\d+)\s*:\s*(?:'([^']*)'|"([^"]*)")"#).expect("valid names pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    pub name: String,
    pub color: Option<[u8; 3]>,
}

/// Fixed id to class-name mapping of a loaded model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
    labels: BTreeMap<u32, ClassLabel>,
}

impl ClassNames {
    pub fn from_names(names: Vec<String>) -> Self {
        let labels = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| (id as u32, ClassLabel { name, color: None }))
            .collect();
        Self { labels }
    }

    /// Parses the `names` entry the Ultralytics exporter writes into ONNX
    /// metadata, e.g. `{0: 'apple', 1: 'banana'}`.
    pub fn from_metadata(raw: &str) -> Self {
        let labels = METADATA_NAME
            .captures_iter(raw)
            .filter_map(|caps| {
                let id = caps[1].parse::<u32>().ok()?;
                let name = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
                Some((id, ClassLabel { name, color: None }))
            })
            .collect();
        Self { labels }
    }

    /// Unknown ids resolve to their decimal string.
    pub fn name(&self, class_id: u32) -> String {
        self.labels
            .get(&class_id)
            .map(|label| label.name.clone())
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn color(&self, class_id: u32) -> Option<[u8; 3]> {
        self.labels.get(&class_id).and_then(|label| label.color)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Reads one class per line, either `name` or `name,r,g,b`. Blank lines are
/// skipped; the line index (blank lines excluded) is the class id.
pub fn load_labels(filepath: &Path) -> io::Result<ClassNames> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = BTreeMap::new();

    for line_result in reader.lines() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split(',').collect();

        let label = match parts.len() {
            1 => ClassLabel {
                name: parts[0].trim().to_string(),
                color: None,
            },
            4 => {
                let channel = |value: &str, which: &str| {
                    value.trim().parse::<u8>().map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, format!("Invalid {} value", which))
                    })
                };
                ClassLabel {
                    name: parts[0].trim().to_string(),
                    color: Some([
                        channel(parts[1], "red")?,
                        channel(parts[2], "green")?,
                        channel(parts[3], "blue")?,
                    ]),
                }
            }
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid line format: {}", line),
                ))
            }
        };
        labels.insert(labels.len() as u32, label);
    }

    Ok(ClassNames { labels })
}
