use crate::execution::PositionLedger;
use crate::models::{LedgerMeta, Position};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ORDERS_SECTION: &str = "ORDERS";
const META_SECTION: &str = "META";

/// Result of reading the ledger file
#[derive(Debug)]
pub enum LedgerLoad {
    Loaded(PositionLedger),
    NotFound,
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("failed to write ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sections to replace in a save; absent sections keep their persisted contents
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerUpdate<'a> {
    pub positions: Option<&'a [Position]>,
    pub meta: Option<&'a LedgerMeta>,
}

impl<'a> LedgerUpdate<'a> {
    pub fn positions(positions: &'a [Position]) -> Self {
        Self {
            positions: Some(positions),
            meta: None,
        }
    }

    pub fn meta(meta: &'a LedgerMeta) -> Self {
        Self {
            positions: None,
            meta: Some(meta),
        }
    }

    pub fn all(ledger: &'a PositionLedger) -> Self {
        Self {
            positions: Some(ledger.positions()),
            meta: Some(ledger.meta()),
        }
    }
}

/// JSON file persistence for the position ledger
///
/// File layout:
/// ```json
/// { "ORDERS": { "<order id>": { "id": .., "price": .., ... } },
///   "META": { "PROFIT": 0.0, "SALES": 0 } }
/// ```
/// Older files without the two sections (a flat map of price key to order)
/// are still readable; every save writes the two-section form.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the ledger file
    pub fn load(&self) -> LedgerLoad {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LedgerLoad::NotFound,
            Err(e) => return LedgerLoad::Corrupt(format!("unreadable: {}", e)),
        };

        let value: Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => return LedgerLoad::Corrupt(format!("invalid JSON: {}", e)),
        };

        match parse_ledger(value) {
            Ok(ledger) => LedgerLoad::Loaded(ledger),
            Err(reason) => LedgerLoad::Corrupt(reason),
        }
    }

    /// Load the ledger, starting empty when the file is missing or invalid
    pub fn load_or_default(&self) -> PositionLedger {
        match self.load() {
            LedgerLoad::Loaded(ledger) => {
                tracing::info!(
                    "Loaded {} open position(s) from {}",
                    ledger.len(),
                    self.path.display()
                );
                ledger
            }
            LedgerLoad::NotFound => {
                tracing::info!(
                    "No ledger at {}, starting with an empty one",
                    self.path.display()
                );
                PositionLedger::new()
            }
            LedgerLoad::Corrupt(reason) => {
                tracing::warn!(
                    "Ledger {} is invalid ({}), starting with an empty one",
                    self.path.display(),
                    reason
                );
                PositionLedger::new()
            }
        }
    }

    /// Read-modify-write: replace only the sections present in `update`
    pub fn save(&self, update: LedgerUpdate<'_>) -> Result<(), LedgerError> {
        let mut document = self.read_document();

        if let Some(positions) = update.positions {
            document.insert(ORDERS_SECTION.to_string(), orders_section(positions)?);
        }
        if let Some(meta) = update.meta {
            document.insert(META_SECTION.to_string(), serde_json::to_value(meta)?);
        }

        if !document.contains_key(ORDERS_SECTION) {
            document.insert(ORDERS_SECTION.to_string(), Value::Object(Map::new()));
        }
        if !document.contains_key(META_SECTION) {
            document.insert(
                META_SECTION.to_string(),
                serde_json::to_value(LedgerMeta::default())?,
            );
        }

        let json = serde_json::to_string_pretty(&Value::Object(document))?;
        self.write_atomic(json.as_bytes())
            .map_err(|source| LedgerError::Io {
                path: self.path.clone(),
                source,
            })?;

        tracing::debug!(
            orders = update.positions.is_some(),
            meta = update.meta.is_some(),
            "Saved ledger to {}",
            self.path.display()
        );

        Ok(())
    }

    /// Current persisted document in two-section form (empty if missing or unparseable)
    ///
    /// Sections that `load` would reject are dropped, so a partial save
    /// replaces them with defaults instead of carrying them forward.
    fn read_document(&self) -> Map<String, Value> {
        let existing = fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str::<Value>(&content).ok());

        let mut document = match existing {
            Some(Value::Object(map)) if is_sectioned(&map) || map.is_empty() => map,
            Some(Value::Object(legacy)) => {
                let mut map = Map::new();
                map.insert(ORDERS_SECTION.to_string(), Value::Object(legacy));
                map
            }
            _ => Map::new(),
        };

        let orders_error = match document.get(ORDERS_SECTION) {
            None | Some(Value::Null) => None,
            Some(Value::Object(orders)) => parse_orders(orders.clone()).err(),
            Some(_) => Some("ORDERS is not an object".to_string()),
        };
        if let Some(reason) = orders_error {
            tracing::warn!(
                "Discarding invalid ORDERS in {} ({})",
                self.path.display(),
                reason
            );
            document.remove(ORDERS_SECTION);
        }

        let meta_error = match document.get(META_SECTION) {
            None | Some(Value::Null) => None,
            Some(meta) => serde_json::from_value::<LedgerMeta>(meta.clone())
                .err()
                .map(|e| e.to_string()),
        };
        if let Some(reason) = meta_error {
            tracing::warn!(
                "Discarding invalid META in {} ({})",
                self.path.display(),
                reason
            );
            document.remove(META_SECTION);
        }

        document
    }

    /// Write to a sibling temp file, fsync, then rename over the ledger
    fn write_atomic(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "ledger.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            e
        })
    }
}

fn is_sectioned(map: &Map<String, Value>) -> bool {
    map.contains_key(ORDERS_SECTION) || map.contains_key(META_SECTION)
}

fn orders_section(positions: &[Position]) -> Result<Value, serde_json::Error> {
    let mut orders = Map::new();
    for position in positions {
        orders.insert(position.id.clone(), serde_json::to_value(position)?);
    }
    Ok(Value::Object(orders))
}

fn parse_ledger(value: Value) -> Result<PositionLedger, String> {
    let Value::Object(mut root) = value else {
        return Err("top level is not an object".to_string());
    };

    if !is_sectioned(&root) {
        // Flat legacy layout: price key -> order, no META
        let positions = parse_orders(root)?;
        return Ok(PositionLedger::with_parts(positions, LedgerMeta::default()));
    }

    let positions = match root.remove(ORDERS_SECTION) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(orders)) => parse_orders(orders)?,
        Some(_) => return Err("ORDERS is not an object".to_string()),
    };

    let meta = match root.remove(META_SECTION) {
        None | Some(Value::Null) => LedgerMeta::default(),
        Some(meta) => serde_json::from_value(meta).map_err(|e| format!("invalid META: {}", e))?,
    };

    Ok(PositionLedger::with_parts(positions, meta))
}

fn parse_orders(orders: Map<String, Value>) -> Result<Vec<Position>, String> {
    orders
        .into_iter()
        .map(|(key, record)| {
            let mut position: Position = serde_json::from_value(record)
                .map_err(|e| format!("invalid order {}: {}", key, e))?;
            if position.id.is_empty() {
                position.id = key;
            }
            Ok(position)
        })
        .collect()
}
