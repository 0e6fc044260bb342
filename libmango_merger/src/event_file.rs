use hdf5::{File, Group};
use ndarray::Array1;
use std::path::Path;

use super::error::EventFileError;

/// Conventional name of the per-event table
pub const DEFAULT_TREE_NAME: &str = "Events";
/// Conventional name of the single-row run metadata table
pub const DEFAULT_AUX_TABLE_NAME: &str = "OtherParam";

/// The operations the annotator needs from a columnar event-data file.
///
/// A tree is a table of equal-length columns. Opening the file is the job of the
/// implementation's constructor; closing happens when the value is dropped.
pub trait EventFile {
    /// Names of all trees in the file
    fn tree_names(&self) -> Result<Vec<String>, EventFileError>;

    fn has_tree(&self, tree: &str) -> bool;

    /// Number of rows (entries) in a tree
    fn entry_count(&self, tree: &str) -> Result<usize, EventFileError>;

    /// Returns false if the tree itself is missing
    fn has_field(&self, tree: &str, field: &str) -> bool;

    /// The column name a field is stored under. Two fields with the same column name
    /// cannot both be written.
    fn column_name(&self, field: &str) -> String {
        field.to_string()
    }

    /// Add a column to an existing tree, with `value` repeated for every entry
    fn append_scalar_field(
        &mut self,
        tree: &str,
        field: &str,
        value: f32,
    ) -> Result<(), EventFileError>;

    /// Write a single-row table, creating it if needed. Existing columns are not checked.
    fn create_aux_table(&mut self, table: &str, fields: &[(String, f32)])
        -> Result<(), EventFileError>;
}

/// HDF5 reserves '/' as the path separator, so it cannot appear in a column name
fn dataset_name(field: &str) -> String {
    field.replace('/', "_")
}

/// An event-data file stored as HDF5.
///
/// Trees are groups at the top level of the file, columns are 1-D datasets inside a
/// group. The file is open read-write for as long as this value lives.
#[derive(Debug)]
pub struct HDFEventFile {
    file_handle: File,
}

impl HDFEventFile {
    /// Open an existing file for appending
    pub fn open(path: &Path) -> Result<Self, EventFileError> {
        let file_handle = File::open_rw(path)?;
        Ok(Self { file_handle })
    }

    fn tree(&self, tree: &str) -> Result<Group, EventFileError> {
        if !self.file_handle.link_exists(tree) {
            return Err(EventFileError::NoSuchTree(tree.to_string()));
        }
        self.file_handle
            .group(tree)
            .map_err(|_| EventFileError::NoSuchTree(tree.to_string()))
    }

    /// Flush everything to disk and release the file
    pub fn close(self) -> Result<(), EventFileError> {
        self.file_handle.flush()?;
        Ok(())
    }
}

impl EventFile for HDFEventFile {
    fn tree_names(&self) -> Result<Vec<String>, EventFileError> {
        Ok(self
            .file_handle
            .member_names()?
            .into_iter()
            .filter(|name| self.file_handle.group(name).is_ok())
            .collect())
    }

    fn has_tree(&self, tree: &str) -> bool {
        self.tree(tree).is_ok()
    }

    fn entry_count(&self, tree: &str) -> Result<usize, EventFileError> {
        let group = self.tree(tree)?;
        // Only 1-D datasets are columns; scalars and images stored in the group are skipped
        let mut count: Option<(String, usize)> = None;
        for dset in group.datasets()? {
            if dset.ndim() != 1 {
                continue;
            }
            let length = dset.shape()[0];
            match &count {
                None => count = Some((dset.name(), length)),
                Some((first, expected)) if *expected != length => {
                    return Err(EventFileError::RaggedTree {
                        tree: tree.to_string(),
                        first_column: first.clone(),
                        first_length: *expected,
                        column: dset.name(),
                        length,
                    })
                }
                Some(_) => (),
            }
        }
        Ok(count.map(|(_, length)| length).unwrap_or(0))
    }

    fn has_field(&self, tree: &str, field: &str) -> bool {
        match self.tree(tree) {
            Ok(group) => group.link_exists(&dataset_name(field)),
            Err(_) => false,
        }
    }

    fn column_name(&self, field: &str) -> String {
        dataset_name(field)
    }

    fn append_scalar_field(
        &mut self,
        tree: &str,
        field: &str,
        value: f32,
    ) -> Result<(), EventFileError> {
        let n_entries = self.entry_count(tree)?;
        let group = self.tree(tree)?;
        let column = Array1::<f32>::from_elem(n_entries, value);
        group
            .new_dataset_builder()
            .with_data(&column)
            .create(dataset_name(field).as_str())?;
        Ok(())
    }

    fn create_aux_table(
        &mut self,
        table: &str,
        fields: &[(String, f32)],
    ) -> Result<(), EventFileError> {
        let group = match self.tree(table) {
            Ok(group) => group,
            Err(_) => self.file_handle.create_group(table)?,
        };
        for (name, value) in fields.iter() {
            let column = Array1::<f32>::from_elem(1, *value);
            group
                .new_dataset_builder()
                .with_data(&column)
                .create(dataset_name(name).as_str())?;
        }
        Ok(())
    }
}
