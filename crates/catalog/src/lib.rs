//! Table schemas and index metadata, persisted as one JSON document.

use std::{fs, io::Read, path::Path};

use ahash::RandomState;
use common::{DbError, DbResult, DiskRead, DiskWrite};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::DataType;

type Map<K, V> = HashMap<K, V, RandomState>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: DataType) -> Column {
        Column {
            name: name.into(),
            kind,
        }
    }
}

/// A secondary index registered on a table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub table: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<Column>,
    /// Ordinal of the primary-key column.
    pub primary_key: usize,
    pub indexes: Vec<IndexMeta>,
}

impl TableMeta {
    pub fn key_column(&self) -> &Column {
        &self.columns[self.primary_key]
    }

    pub fn has_column(&self, name: &str, kind: DataType) -> bool {
        self.columns
            .iter()
            .any(|c| c.name == name && c.kind == kind)
    }
}

/// Persistent catalog of table schemas and their indexes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    #[serde(skip)]
    #[serde(default)]
    table_name_index: Map<String, usize>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    /// Loads from disk; a missing file yields an empty catalog.
    pub fn load(path: &Path) -> DbResult<Catalog> {
        if !path.exists() {
            return Ok(Catalog::new());
        }
        let data = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_index();
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.table_name_index = self
            .tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }

    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        primary_key: usize,
    ) -> DbResult<()> {
        if self.table_name_index.contains_key(name) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "a table needs at least one column".into(),
            ));
        }
        if primary_key >= columns.len() {
            return Err(DbError::Catalog(format!(
                "primary key ordinal {primary_key} is out of range for {} columns",
                columns.len()
            )));
        }

        self.tables.push(TableMeta {
            name: name.to_string(),
            columns,
            primary_key,
            indexes: Vec::new(),
        });
        self.rebuild_index();
        Ok(())
    }

    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        self.table_name_index
            .get(name)
            .and_then(|&i| self.tables.get(i))
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{name}'")))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table_name_index.contains_key(name)
    }

    pub fn create_index(&mut self, table: &str, index: &str) -> DbResult<()> {
        let at = *self
            .table_name_index
            .get(table)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{table}'")))?;
        let meta = &mut self.tables[at];
        if meta.indexes.iter().any(|ix| ix.name == index) {
            return Err(DbError::Catalog(format!(
                "index '{index}' already exists on table '{table}'"
            )));
        }
        meta.indexes.push(IndexMeta {
            table: table.to_string(),
            name: index.to_string(),
        });
        Ok(())
    }

    /// Every index across every table; the engine warms one tree per
    /// entry at start-up.
    pub fn list_indices(&self) -> impl Iterator<Item = &IndexMeta> {
        self.tables.iter().flat_map(|t| t.indexes.iter())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }
}

impl DiskWrite for Catalog {
    fn to_bytes(&self) -> DbResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))
    }
}

impl DiskRead for Catalog {
    fn load_from(&mut self, reader: &mut dyn Read) -> DbResult<()> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        let mut catalog: Catalog = serde_json::from_slice(&buf)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_index();
        *self = catalog;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn user_columns() -> Vec<Column> {
        vec![
            Column::new("id", DataType::Int),
            Column::new("name", DataType::Text),
            Column::new("active", DataType::Bool),
        ]
    }

    #[test]
    fn create_and_look_up_tables() {
        let mut catalog = Catalog::new();
        catalog.create_table("users", user_columns(), 0).unwrap();

        assert!(catalog.has_table("users"));
        let meta = catalog.table("users").unwrap();
        assert_eq!(meta.columns.len(), 3);
        assert_eq!(meta.key_column().name, "id");
        assert!(meta.has_column("name", DataType::Text));
        assert!(!meta.has_column("name", DataType::Int));
        assert!(matches!(
            catalog.table("orders"),
            Err(DbError::Catalog(_))
        ));
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let mut catalog = Catalog::new();
        catalog.create_table("users", user_columns(), 0).unwrap();
        assert!(matches!(
            catalog.create_table("users", user_columns(), 0),
            Err(DbError::Catalog(_))
        ));
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        let mut catalog = Catalog::new();
        assert!(catalog.create_table("empty", Vec::new(), 0).is_err());
        assert!(catalog.create_table("t", user_columns(), 3).is_err());
    }

    #[test]
    fn indexes_register_once_per_name() {
        let mut catalog = Catalog::new();
        catalog.create_table("users", user_columns(), 0).unwrap();
        catalog.create_index("users", "by_name").unwrap();

        assert!(catalog.create_index("users", "by_name").is_err());
        assert!(catalog.create_index("orders", "by_id").is_err());

        let all: Vec<&IndexMeta> = catalog.list_indices().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].table, "users");
        assert_eq!(all[0].name, "by_name");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("__catalog.db");

        let mut catalog = Catalog::new();
        catalog.create_table("users", user_columns(), 1).unwrap();
        catalog.create_index("users", "by_id").unwrap();
        catalog.save(&path).unwrap();

        let restored = Catalog::load(&path).unwrap();
        assert_eq!(restored.table("users").unwrap(), catalog.table("users").unwrap());
        assert_eq!(restored.list_indices().count(), 1);
    }

    #[test]
    fn loading_a_missing_file_yields_an_empty_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("nope.db")).unwrap();
        assert_eq!(catalog.tables().count(), 0);
    }

    #[test]
    fn blob_round_trip_rebuilds_lookups() {
        let mut catalog = Catalog::new();
        catalog.create_table("users", user_columns(), 0).unwrap();

        let blob = catalog.to_bytes().unwrap();
        let mut restored = Catalog::new();
        restored.load_from(&mut blob.as_slice()).unwrap();
        assert!(restored.has_table("users"));
        assert_eq!(restored.table("users").unwrap().primary_key, 0);
    }
}
