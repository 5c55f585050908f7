//! Zarr-backed AnnData reader/writer for `.zarr` directories.
//!
//! The layout follows the AnnData element conventions used for `.h5ad`, with
//! node attributes stored as JSON: `X` is a dense array or a
//! `csr_matrix`/`csc_matrix` group carrying a `shape` attribute, `obs`/`var`
//! are `dataframe` groups with `_index` and `column-order` attributes, and
//! categorical columns are `codes`/`categories` groups. `uns` is a `dict`
//! group of child arrays and nested `dict` groups; scalars are one-element
//! arrays tagged `string` or `numeric-scalar`. JSON attributes on a `uns`
//! group are read as entries too.
//!
//! Output is Zarr v3 (`zarr.json` metadata). The `zarrs` crate reads v2
//! stores but only writes v3, so consumers limited to Zarr v2 need the
//! store converted first.
//!
//! Requires the `zarr` feature flag.

use std::collections::BTreeMap;
use std::num::NonZeroU64;
use std::path::Path;
use std::sync::Arc;

use log::warn;
use serde_json::{json, Map, Value};
use zarrs::array::chunk_grid::ChunkGrid;
use zarrs::array::{Array, ArrayBuilder, DataType, FillValue};
use zarrs::filesystem::FilesystemStore;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{ReadableWritableListableStorage, ReadableWritableListableStorageTraits};

use scmerge_core::{Result, ScmergeError};

use crate::accessor::{DatasetStore, KNOWN_ELEMENTS};
use crate::dataset::{Dataset, Embedding};
use crate::matrix::MatrixData;
use crate::sparse::{SparseLayout, SparseMatrix};
use crate::table::{ColumnData, Table};
use crate::uns::UnsValue;

type Store = ReadableWritableListableStorage;

fn zarr_err(e: impl std::fmt::Display) -> ScmergeError {
    ScmergeError::Storage(format!("Zarr error: {e}"))
}

/// The `.zarr` variant of [`DatasetStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrStore;

impl DatasetStore for ZarrStore {
    fn extension(&self) -> &'static str {
        "zarr"
    }

    fn read(&self, path: &Path) -> Result<Dataset> {
        read_zarr(path)
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        write_zarr(dataset, path)
    }

    fn read_var_names(&self, path: &Path) -> Result<Vec<String>> {
        let store = open_store(path)?;
        read_frame_index(&store, "/var")
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn open_store(path: &Path) -> Result<Store> {
    if !path.exists() {
        return Err(ScmergeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{}: not found", path.display()),
        )));
    }
    Ok(Arc::new(FilesystemStore::new(path).map_err(zarr_err)?))
}

/// Read a `.zarr` directory into a [`Dataset`].
pub fn read_zarr<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let root = path.as_ref();
    let store = open_store(root)?;

    let x = read_x(&store)?;
    let (n_obs, n_vars) = x.shape();
    let obs = read_frame_or_default(&store, "/obs", n_obs)?;
    let var = read_frame_or_default(&store, "/var", n_vars)?;

    let mut obsm = BTreeMap::new();
    if let Ok(group) = Group::open(store.clone(), "/obsm") {
        for name in member_names(root, "/obsm", group.attributes()) {
            match read_embedding(&store, &format!("/obsm/{name}")) {
                Ok(emb) => {
                    obsm.insert(name, emb);
                }
                Err(e) => warn!("skipping obsm '{name}': {e}"),
            }
        }
    }

    let uns = match Group::open(store.clone(), "/uns") {
        Ok(group) => read_uns_dict(&store, root, "/uns", &group)?,
        Err(_) => BTreeMap::new(),
    };

    for name in listed_members(root, "/") {
        if !KNOWN_ELEMENTS.contains(&name.as_str()) {
            warn!("dropping unsupported element '{name}'");
        }
    }

    Dataset::from_parts(x, Arc::new(obs), var, Arc::new(obsm), Arc::new(uns))
}

/// Write a [`Dataset`] to a `.zarr` directory.
pub fn write_zarr<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();

    std::fs::create_dir_all(path).map_err(|e| {
        ScmergeError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    let store: Store = Arc::new(FilesystemStore::new(path).map_err(zarr_err)?);

    write_group(&store, "/", encoding("anndata", "0.1.0"))?;

    write_matrix(&store, "/X", dataset.x())?;
    write_frame(&store, "/obs", dataset.obs())?;
    write_frame(&store, "/var", dataset.var())?;

    let mut obsm_attrs = encoding("dict", "0.1.0");
    obsm_attrs.insert(
        "keys".into(),
        json!(dataset.obsm().keys().collect::<Vec<_>>()),
    );
    write_group(&store, "/obsm", obsm_attrs)?;
    for (key, emb) in dataset.obsm() {
        write_embedding(&store, &format!("/obsm/{key}"), emb, dataset.obs_names())?;
    }

    write_uns_dict(&store, "/uns", dataset.uns())?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Internal: groups and attributes
// ---------------------------------------------------------------------------

fn encoding(kind: &str, version: &str) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("encoding-type".into(), json!(kind));
    attrs.insert("encoding-version".into(), json!(version));
    attrs
}

fn write_group(store: &Store, path: &str, attributes: Map<String, Value>) -> Result<()> {
    let group = GroupBuilder::new()
        .attributes(attributes)
        .build(store.clone(), path)
        .map_err(zarr_err)?;
    group.store_metadata().map_err(zarr_err)?;
    Ok(())
}

fn attr_str<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs.get(key).and_then(Value::as_str)
}

fn attr_strings(attrs: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    attrs.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Members of a group, from its `column-order`/`keys` attribute when present,
/// otherwise from the directory listing.
fn member_names(root: &Path, group_path: &str, attrs: &Map<String, Value>) -> Vec<String> {
    if let Some(names) = attr_strings(attrs, "column-order").or_else(|| attr_strings(attrs, "keys"))
    {
        return names;
    }
    listed_members(root, group_path)
}

/// Child node names of a group, from the directory listing.
fn listed_members(root: &Path, group_path: &str) -> Vec<String> {
    let group_dir = root.join(group_path.trim_start_matches('/'));
    let entries = match std::fs::read_dir(&group_dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name != "zarr.json" && !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Internal: chunk grid helper
// ---------------------------------------------------------------------------

fn make_chunk_grid(shape: &[u64]) -> ChunkGrid {
    let nz: Vec<NonZeroU64> = shape
        .iter()
        .map(|&s| NonZeroU64::new(s).unwrap_or(NonZeroU64::MIN))
        .collect();
    ChunkGrid::from(nz)
}

// ---------------------------------------------------------------------------
// Internal: typed arrays
// ---------------------------------------------------------------------------

macro_rules! write_typed_array {
    ($name:ident, $ty:ty, $dtype:expr, $fill:expr) => {
        fn $name(
            store: &Store,
            path: &str,
            data: &[$ty],
            shape: &[u64],
            attributes: Map<String, Value>,
        ) -> Result<()> {
            let total: u64 = shape.iter().product();
            let array = ArrayBuilder::new(
                shape.to_vec(),
                $dtype,
                make_chunk_grid(shape),
                FillValue::from($fill),
            )
            .attributes(attributes)
            .build(store.clone(), path)
            .map_err(zarr_err)?;
            array.store_metadata().map_err(zarr_err)?;
            if total > 0 {
                array
                    .store_array_subset_elements::<$ty>(&array.subset_all(), data)
                    .map_err(zarr_err)?;
            }
            Ok(())
        }
    };
}

write_typed_array!(write_f64_array, f64, DataType::Float64, 0.0f64);
write_typed_array!(write_i64_array, i64, DataType::Int64, 0i64);
write_typed_array!(write_i32_array, i32, DataType::Int32, 0i32);
write_typed_array!(write_bool_array, bool, DataType::Bool, false);

fn write_string_array(
    store: &Store,
    path: &str,
    values: &[String],
    attributes: Map<String, Value>,
) -> Result<()> {
    let n = values.len() as u64;
    let array = ArrayBuilder::new(
        vec![n],
        DataType::String,
        make_chunk_grid(&[n]),
        FillValue::from(""),
    )
    .attributes(attributes)
    .build(store.clone(), path)
    .map_err(zarr_err)?;
    array.store_metadata().map_err(zarr_err)?;
    if n > 0 {
        array
            .store_array_subset_elements::<String>(&array.subset_all(), values)
            .map_err(zarr_err)?;
    }
    Ok(())
}

fn read_strings(store: &Store, path: &str) -> Result<Vec<String>> {
    let array = Array::open(store.clone(), path).map_err(zarr_err)?;
    if array.shape().iter().product::<u64>() == 0 {
        return Ok(Vec::new());
    }
    array
        .retrieve_array_subset_elements::<String>(&array.subset_all())
        .map_err(zarr_err)
}

/// Read any numeric array as `f64`.
fn read_f64_elements(array: &Array<dyn ReadableWritableListableStorageTraits>) -> Result<Vec<f64>> {
    if array.shape().iter().product::<u64>() == 0 {
        return Ok(Vec::new());
    }
    let subset = array.subset_all();
    let values = match array.data_type() {
        DataType::Float64 => array.retrieve_array_subset_elements::<f64>(&subset),
        DataType::Float32 => array
            .retrieve_array_subset_elements::<f32>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect()),
        DataType::Int64 => array
            .retrieve_array_subset_elements::<i64>(&subset)
            .map(|v| v.into_iter().map(|x| x as f64).collect()),
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect()),
        DataType::Int16 => array
            .retrieve_array_subset_elements::<i16>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect()),
        DataType::Int8 => array
            .retrieve_array_subset_elements::<i8>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect()),
        DataType::UInt64 => array
            .retrieve_array_subset_elements::<u64>(&subset)
            .map(|v| v.into_iter().map(|x| x as f64).collect()),
        DataType::UInt32 => array
            .retrieve_array_subset_elements::<u32>(&subset)
            .map(|v| v.into_iter().map(f64::from).collect()),
        dt => {
            return Err(ScmergeError::Format(format!(
                "unsupported zarr data type: {dt:?}"
            )))
        }
    };
    values.map_err(zarr_err)
}

/// Read any integer array as `i64`.
fn read_i64_elements(array: &Array<dyn ReadableWritableListableStorageTraits>) -> Result<Vec<i64>> {
    if array.shape().iter().product::<u64>() == 0 {
        return Ok(Vec::new());
    }
    let subset = array.subset_all();
    let values = match array.data_type() {
        DataType::Int64 => array.retrieve_array_subset_elements::<i64>(&subset),
        DataType::Int32 => array
            .retrieve_array_subset_elements::<i32>(&subset)
            .map(|v| v.into_iter().map(i64::from).collect()),
        DataType::Int16 => array
            .retrieve_array_subset_elements::<i16>(&subset)
            .map(|v| v.into_iter().map(i64::from).collect()),
        DataType::Int8 => array
            .retrieve_array_subset_elements::<i8>(&subset)
            .map(|v| v.into_iter().map(i64::from).collect()),
        DataType::UInt32 => array
            .retrieve_array_subset_elements::<u32>(&subset)
            .map(|v| v.into_iter().map(i64::from).collect()),
        DataType::UInt64 => {
            let raw = array
                .retrieve_array_subset_elements::<u64>(&subset)
                .map_err(zarr_err)?;
            return raw
                .into_iter()
                .map(|x| {
                    i64::try_from(x)
                        .map_err(|_| ScmergeError::Format(format!("value {x} overflows i64")))
                })
                .collect();
        }
        dt => {
            return Err(ScmergeError::Format(format!(
                "unsupported zarr integer type: {dt:?}"
            )))
        }
    };
    values.map_err(zarr_err)
}

fn read_usize_array(store: &Store, path: &str) -> Result<Vec<usize>> {
    let array = Array::open(store.clone(), path).map_err(zarr_err)?;
    read_f64_elements(&array)?
        .into_iter()
        .map(|v| {
            if v < 0.0 {
                Err(ScmergeError::Format(format!("negative value {v} in {path}")))
            } else {
                Ok(v as usize)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Internal: X matrix
// ---------------------------------------------------------------------------

fn write_matrix(store: &Store, path: &str, x: &MatrixData) -> Result<()> {
    match x {
        MatrixData::Dense(rows) => {
            let n_rows = rows.len();
            let n_cols = rows.first().map_or(0, |r| r.len());
            let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
            write_f64_array(
                store,
                path,
                &flat,
                &[n_rows as u64, n_cols as u64],
                encoding("array", "0.2.0"),
            )?;
        }
        MatrixData::Sparse(sm) => {
            let (n_rows, n_cols) = sm.shape();
            let mut attrs = encoding(sm.layout().encoding_type(), "0.1.0");
            attrs.insert("shape".into(), json!([n_rows, n_cols]));
            write_group(store, path, attrs)?;

            write_f64_array(
                store,
                &format!("{path}/data"),
                sm.data(),
                &[sm.nnz() as u64],
                Map::new(),
            )?;
            for (key, values) in [("indices", sm.indices()), ("indptr", sm.indptr())] {
                let as_i64: Vec<i64> = values.iter().map(|&v| v as i64).collect();
                write_i64_array(
                    store,
                    &format!("{path}/{key}"),
                    &as_i64,
                    &[as_i64.len() as u64],
                    Map::new(),
                )?;
            }
        }
    }
    Ok(())
}

fn read_x(store: &Store) -> Result<MatrixData> {
    if let Ok(array) = Array::open(store.clone(), "/X") {
        let shape = array.shape().to_vec();
        if shape.len() != 2 {
            return Err(ScmergeError::Format(format!(
                "X must be 2-dimensional, found {} dimensions",
                shape.len()
            )));
        }
        let n_cols = shape[1] as usize;
        let flat = read_f64_elements(&array)?;
        let rows = if n_cols == 0 {
            vec![Vec::new(); shape[0] as usize]
        } else {
            flat.chunks(n_cols).map(|c| c.to_vec()).collect()
        };
        return Ok(MatrixData::Dense(rows));
    }

    let group = Group::open(store.clone(), "/X")
        .map_err(|e| ScmergeError::Format(format!("no X array or group found: {e}")))?;
    let attrs = group.attributes();
    let layout = match attr_str(attrs, "encoding-type") {
        None => SparseLayout::Csr,
        Some(kind) => SparseLayout::from_encoding_type(kind).ok_or_else(|| {
            ScmergeError::Format(format!("unsupported X encoding-type: {kind}"))
        })?,
    };
    let shape: Vec<usize> = attrs
        .get("shape")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or_else(|| ScmergeError::Format("sparse X is missing its shape attribute".into()))?;
    if shape.len() != 2 {
        return Err(ScmergeError::Format("sparse shape attribute must have 2 entries".into()));
    }

    let data_arr = Array::open(store.clone(), "/X/data").map_err(zarr_err)?;
    let data = read_f64_elements(&data_arr)?;
    let indices = read_usize_array(store, "/X/indices")?;
    let indptr = read_usize_array(store, "/X/indptr")?;

    let sm = SparseMatrix::from_compressed(layout, data, indices, indptr, shape[0], shape[1])?;
    Ok(MatrixData::Sparse(sm))
}

// ---------------------------------------------------------------------------
// Internal: dataframes
// ---------------------------------------------------------------------------

fn write_frame(store: &Store, path: &str, table: &Table) -> Result<()> {
    let mut attrs = encoding("dataframe", "0.2.0");
    attrs.insert("_index".into(), json!("_index"));
    attrs.insert("column-order".into(), json!(table.column_names()));
    write_group(store, path, attrs)?;

    write_string_array(
        store,
        &format!("{path}/_index"),
        table.index(),
        encoding("string-array", "0.2.0"),
    )?;
    for (name, col) in table.columns() {
        write_column(store, &format!("{path}/{name}"), col)?;
    }
    Ok(())
}

fn write_column(store: &Store, path: &str, col: &ColumnData) -> Result<()> {
    match col {
        ColumnData::Strings(vals) => {
            write_string_array(store, path, vals, encoding("string-array", "0.2.0"))?;
        }
        ColumnData::Numeric(vals) => {
            write_f64_array(
                store,
                path,
                vals,
                &[vals.len() as u64],
                encoding("array", "0.2.0"),
            )?;
        }
        ColumnData::Boolean(vals) => {
            let flat: Vec<bool> = vals.iter().map(|b| b.unwrap_or(false)).collect();
            write_bool_array(
                store,
                path,
                &flat,
                &[flat.len() as u64],
                encoding("array", "0.2.0"),
            )?;
        }
        ColumnData::Categorical { codes, categories } => {
            let mut attrs = encoding("categorical", "0.2.0");
            attrs.insert("ordered".into(), json!(false));
            write_group(store, path, attrs)?;
            write_i32_array(
                store,
                &format!("{path}/codes"),
                codes,
                &[codes.len() as u64],
                encoding("array", "0.2.0"),
            )?;
            write_string_array(
                store,
                &format!("{path}/categories"),
                categories,
                encoding("string-array", "0.2.0"),
            )?;
        }
    }
    Ok(())
}

fn read_frame_index(store: &Store, path: &str) -> Result<Vec<String>> {
    let group = Group::open(store.clone(), path).map_err(zarr_err)?;
    let index_name = attr_str(group.attributes(), "_index").unwrap_or("_index");
    read_strings(store, &format!("{path}/{index_name}"))
}

fn read_frame_or_default(store: &Store, path: &str, expected: usize) -> Result<Table> {
    let group = match Group::open(store.clone(), path) {
        Ok(g) => g,
        Err(_) => return Ok(Table::new((0..expected).map(|i| format!("{i}")).collect())),
    };
    read_frame(store, path, &group)
}

fn read_frame(
    store: &Store,
    path: &str,
    group: &Group<dyn ReadableWritableListableStorageTraits>,
) -> Result<Table> {
    let attrs = group.attributes();
    let index_name = attr_str(attrs, "_index").unwrap_or("_index").to_string();
    let index = read_strings(store, &format!("{path}/{index_name}"))?;
    let columns = attr_strings(attrs, "column-order").unwrap_or_default();

    let mut table = Table::new(index);
    for name in columns {
        match read_column(store, &format!("{path}/{name}")) {
            Ok(col) => table.insert(&name, col)?,
            Err(e) => warn!("skipping column '{name}' of {path}: {e}"),
        }
    }
    Ok(table)
}

fn read_column(store: &Store, path: &str) -> Result<ColumnData> {
    if let Ok(array) = Array::open(store.clone(), path) {
        return match array.data_type() {
            DataType::String => read_strings(store, path).map(ColumnData::Strings),
            DataType::Bool => {
                let vals = if array.shape().iter().product::<u64>() == 0 {
                    Vec::new()
                } else {
                    array
                        .retrieve_array_subset_elements::<bool>(&array.subset_all())
                        .map_err(zarr_err)?
                };
                Ok(ColumnData::Boolean(vals.into_iter().map(Some).collect()))
            }
            _ => read_f64_elements(&array).map(ColumnData::Numeric),
        };
    }

    // Categorical group of codes + categories
    let codes_arr = Array::open(store.clone(), &format!("{path}/codes")).map_err(zarr_err)?;
    let codes = read_f64_elements(&codes_arr)?
        .into_iter()
        .map(|c| c as i32)
        .collect();
    let categories = read_strings(store, &format!("{path}/categories"))?;
    Ok(ColumnData::Categorical { codes, categories })
}

// ---------------------------------------------------------------------------
// Internal: embeddings
// ---------------------------------------------------------------------------

fn write_embedding(store: &Store, path: &str, emb: &Embedding, obs_names: &[String]) -> Result<()> {
    if let Some(columns) = emb.stored_columns() {
        let mut table = Table::new(obs_names.to_vec());
        for (j, name) in columns.iter().enumerate() {
            let values = emb.values().iter().map(|r| r[j]).collect();
            table.insert(name, ColumnData::Numeric(values))?;
        }
        return write_frame(store, path, &table);
    }

    let flat: Vec<f64> = emb.values().iter().flat_map(|r| r.iter().copied()).collect();
    write_f64_array(
        store,
        path,
        &flat,
        &[emb.n_rows() as u64, emb.n_cols() as u64],
        encoding("array", "0.2.0"),
    )
}

fn read_embedding(store: &Store, path: &str) -> Result<Embedding> {
    if let Ok(array) = Array::open(store.clone(), path) {
        let shape = array.shape().to_vec();
        if shape.len() != 2 {
            return Err(ScmergeError::Format(format!(
                "{path} must be 2-dimensional, found {} dimensions",
                shape.len()
            )));
        }
        let n_cols = shape[1] as usize;
        let flat = read_f64_elements(&array)?;
        let rows = if n_cols == 0 {
            vec![Vec::new(); shape[0] as usize]
        } else {
            flat.chunks(n_cols).map(|c| c.to_vec()).collect()
        };
        return Ok(Embedding::array(rows));
    }

    let group = Group::open(store.clone(), path).map_err(zarr_err)?;
    let table = read_frame(store, path, &group)?;
    let mut names = Vec::with_capacity(table.n_columns());
    let mut by_column = Vec::with_capacity(table.n_columns());
    for (name, col) in table.columns() {
        let values = col.as_numeric().ok_or_else(|| {
            ScmergeError::Format(format!("{path} column '{name}' is not numeric"))
        })?;
        names.push(name.to_string());
        by_column.push(values.clone());
    }
    let rows = (0..table.len())
        .map(|r| by_column.iter().map(|c| c[r]).collect())
        .collect();
    Embedding::frame(rows, names)
}

// ---------------------------------------------------------------------------
// Internal: uns
// ---------------------------------------------------------------------------

fn write_uns_dict(store: &Store, path: &str, entries: &BTreeMap<String, UnsValue>) -> Result<()> {
    write_group(store, path, encoding("dict", "0.1.0"))?;
    for (name, value) in entries {
        write_uns_value(store, &format!("{path}/{name}"), value)?;
    }
    Ok(())
}

fn write_uns_value(store: &Store, path: &str, value: &UnsValue) -> Result<()> {
    let attrs = encoding(value.encoding_type(), value.encoding_version());
    match value {
        UnsValue::Dict(entries) => write_uns_dict(store, path, entries),
        UnsValue::String(s) => write_string_array(store, path, std::slice::from_ref(s), attrs),
        UnsValue::Bool(b) => write_bool_array(store, path, &[*b], &[1], attrs),
        UnsValue::Int(i) => write_i64_array(store, path, &[*i], &[1], attrs),
        UnsValue::Float(f) => write_f64_array(store, path, &[*f], &[1], attrs),
        UnsValue::Strings(v) => write_string_array(store, path, v, attrs),
        UnsValue::Ints(v) => write_i64_array(store, path, v, &[v.len() as u64], attrs),
        UnsValue::Floats(v) => write_f64_array(store, path, v, &[v.len() as u64], attrs),
    }
}

/// Read a `dict` group: JSON attributes first, then child nodes, which win
/// on a name clash. Unsupported entries are skipped with a warning.
fn read_uns_dict(
    store: &Store,
    root: &Path,
    path: &str,
    group: &Group<dyn ReadableWritableListableStorageTraits>,
) -> Result<BTreeMap<String, UnsValue>> {
    let mut entries = BTreeMap::new();
    for (key, value) in group.attributes() {
        if key.starts_with("encoding-") {
            continue;
        }
        match uns_from_json(value) {
            Some(v) => {
                entries.insert(key.clone(), v);
            }
            None => warn!("dropping attribute '{key}' of {path}: unsupported JSON value"),
        }
    }
    for name in listed_members(root, path) {
        let child = format!("{path}/{name}");
        match read_uns_node(store, root, &child) {
            Ok(value) => {
                entries.insert(name, value);
            }
            Err(e) => warn!("dropping '{child}': {e}"),
        }
    }
    Ok(entries)
}

fn read_uns_node(store: &Store, root: &Path, path: &str) -> Result<UnsValue> {
    if let Ok(array) = Array::open(store.clone(), path) {
        return read_uns_array(&array);
    }
    let group = Group::open(store.clone(), path).map_err(zarr_err)?;
    match attr_str(group.attributes(), "encoding-type") {
        None | Some("dict") => Ok(UnsValue::Dict(read_uns_dict(store, root, path, &group)?)),
        Some(kind) => Err(ScmergeError::Format(format!(
            "unsupported encoding-type {kind}"
        ))),
    }
}

fn read_uns_array(array: &Array<dyn ReadableWritableListableStorageTraits>) -> Result<UnsValue> {
    let shape = array.shape();
    if shape.len() > 1 {
        return Err(ScmergeError::Format(format!(
            "unsupported {}-d array",
            shape.len()
        )));
    }
    let scalar = shape.is_empty()
        || matches!(
            attr_str(array.attributes(), "encoding-type"),
            Some("string" | "numeric-scalar")
        );
    let empty = shape.iter().product::<u64>() == 0;

    let value = match array.data_type() {
        DataType::String => {
            let values = if empty {
                Vec::new()
            } else {
                array
                    .retrieve_array_subset_elements::<String>(&array.subset_all())
                    .map_err(zarr_err)?
            };
            if scalar {
                UnsValue::String(single(values)?)
            } else {
                UnsValue::Strings(values)
            }
        }
        DataType::Bool if scalar => {
            let values = array
                .retrieve_array_subset_elements::<bool>(&array.subset_all())
                .map_err(zarr_err)?;
            UnsValue::Bool(single(values)?)
        }
        DataType::Bool => {
            return Err(ScmergeError::Format("boolean arrays are not supported".into()))
        }
        DataType::Float64 | DataType::Float32 => {
            let values = read_f64_elements(array)?;
            if scalar {
                UnsValue::Float(single(values)?)
            } else {
                UnsValue::Floats(values)
            }
        }
        _ => {
            let values = read_i64_elements(array)?;
            if scalar {
                UnsValue::Int(single(values)?)
            } else {
                UnsValue::Ints(values)
            }
        }
    };
    Ok(value)
}

fn single<T>(mut values: Vec<T>) -> Result<T> {
    match values.len() {
        1 => Ok(values.remove(0)),
        n => Err(ScmergeError::Format(format!("scalar holds {n} values"))),
    }
}

fn uns_from_json(value: &Value) -> Option<UnsValue> {
    let converted = match value {
        Value::Null => return None,
        Value::String(s) => UnsValue::String(s.clone()),
        Value::Bool(b) => UnsValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => UnsValue::Int(i),
            None => UnsValue::Float(n.as_f64()?),
        },
        Value::Array(items) => {
            if let Some(v) = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
            {
                UnsValue::Strings(v)
            } else if let Some(v) = items.iter().map(Value::as_i64).collect::<Option<Vec<_>>>() {
                UnsValue::Ints(v)
            } else {
                UnsValue::Floats(items.iter().map(Value::as_f64).collect::<Option<Vec<_>>>()?)
            }
        }
        Value::Object(map) => UnsValue::Dict(
            map.iter()
                .filter_map(|(k, v)| uns_from_json(v).map(|v| (k.clone(), v)))
                .collect(),
        ),
    };
    Some(converted)
}
