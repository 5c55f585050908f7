//! HDF5-backed reader/writer for `.h5ad` files.
//!
//! `.h5ad` is the single-file AnnData format. Elements carry
//! `encoding-type`/`encoding-version` attributes: `X` is a dense `array` or a
//! `csr_matrix`/`csc_matrix` group, `obs`/`var` are `dataframe` groups whose
//! `_index` attribute names the index dataset and whose `column-order`
//! attribute lists the columns, categorical columns are groups of
//! `codes`/`categories`. `uns` is a `dict` group whose children are scalar
//! or one-dimensional datasets and nested `dict` groups.
//!
//! Requires the `h5ad` feature flag and a system HDF5 library installation
//! (`brew install hdf5` on macOS, `apt install libhdf5-dev` on Linux).

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{File, Group, Location};
use log::warn;

use scmerge_core::{Result, ScmergeError};

use crate::accessor::{DatasetStore, KNOWN_ELEMENTS};
use crate::dataset::{Dataset, Embedding, Sidecars};
use crate::matrix::MatrixData;
use crate::sparse::{SparseLayout, SparseMatrix};
use crate::table::{ColumnData, Table};
use crate::uns::UnsValue;

fn h5err(e: hdf5::Error) -> ScmergeError {
    ScmergeError::Storage(format!("HDF5 error: {e}"))
}

fn unicode(s: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(s)
        .map_err(|e| ScmergeError::Format(format!("string {s:?} cannot be stored in HDF5: {e}")))
}

fn unicode_array(values: &[String]) -> Result<ndarray::Array1<VarLenUnicode>> {
    let v = values.iter().map(|s| unicode(s)).collect::<Result<Vec<_>>>()?;
    Ok(ndarray::Array1::from(v))
}

/// Write a VarLenUnicode scalar attribute on any HDF5 location.
/// Uses a macro because Group, Dataset, etc. all expose `new_attr` via Deref
/// chains but don't share a single trait that function generics can bind on.
macro_rules! write_attr_str {
    ($loc:expr, $key:expr, $val:expr) => {{
        let s = unicode($val)?;
        $loc.new_attr::<VarLenUnicode>()
            .create($key)
            .and_then(|attr| attr.write_scalar(&s))
            .map_err(h5err)
    }};
}

macro_rules! write_encoding {
    ($loc:expr, $kind:expr, $version:expr) => {{
        write_attr_str!($loc, "encoding-type", $kind)?;
        write_attr_str!($loc, "encoding-version", $version)
    }};
}

/// The `.h5ad` variant of [`DatasetStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct H5adStore;

impl DatasetStore for H5adStore {
    fn extension(&self) -> &'static str {
        "h5ad"
    }

    fn read(&self, path: &Path) -> Result<Dataset> {
        read_h5ad(path)
    }

    fn write(&self, dataset: &Dataset, path: &Path) -> Result<()> {
        write_h5ad(dataset, path)
    }

    fn read_var_names(&self, path: &Path) -> Result<Vec<String>> {
        let file = open(path)?;
        let var = file.group("var").map_err(h5err)?;
        read_frame_index(&var)
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        ScmergeError::Storage(format!("cannot open h5ad file {}: {e}", path.display()))
    })
}

/// Read an `.h5ad` file into a [`Dataset`].
pub fn read_h5ad<P: AsRef<Path>>(path: P) -> Result<Dataset> {
    let file = open(path.as_ref())?;
    let x = read_x(&file)?;
    let sidecars = read_sidecars(&file, x.shape())?;
    let uns = read_uns(&file)?;
    warn_unsupported_members(&file)?;
    Dataset::from_parts(
        x,
        Arc::new(sidecars.obs),
        sidecars.var,
        Arc::new(sidecars.obsm),
        Arc::new(uns),
    )
}

/// Read only `obs`, `var`, and `obsm` from an `.h5ad` file; `X` is never touched.
pub fn read_h5ad_sidecars<P: AsRef<Path>>(path: P) -> Result<Sidecars> {
    let file = open(path.as_ref())?;
    read_sidecars(&file, (0, 0))
}

/// Write a [`Dataset`] to an `.h5ad` file.
pub fn write_h5ad<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|e| {
        ScmergeError::Storage(format!(
            "cannot create h5ad file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    write_encoding!(file, "anndata", "0.1.0")?;

    write_matrix(&file, "X", dataset.x())?;

    let obs = file.create_group("obs").map_err(h5err)?;
    write_frame(&obs, dataset.obs())?;
    let var = file.create_group("var").map_err(h5err)?;
    write_frame(&var, dataset.var())?;

    let obsm = file.create_group("obsm").map_err(h5err)?;
    write_encoding!(obsm, "dict", "0.1.0")?;
    for (key, emb) in dataset.obsm() {
        write_embedding(&obsm, key, emb, dataset.obs_names())?;
    }

    let uns = file.create_group("uns").map_err(h5err)?;
    write_uns_dict(&uns, dataset.uns())?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Read a string attribute from any location (if present).
fn read_attr_str(loc: &Location, key: &str) -> Option<String> {
    loc.attr(key)
        .ok()
        .and_then(|a| a.read_scalar::<VarLenUnicode>().ok())
        .map(|s| s.as_str().to_string())
}

fn read_sidecars(file: &File, (n_obs, n_vars): (usize, usize)) -> Result<Sidecars> {
    let obs = read_frame_or_default(file, "obs", n_obs)?;
    let var = read_frame_or_default(file, "var", n_vars)?;
    let mut obsm = BTreeMap::new();
    if file.link_exists("obsm") {
        let group = file.group("obsm").map_err(h5err)?;
        for name in group.member_names().map_err(h5err)? {
            match read_embedding(&group, &name) {
                Ok(emb) => {
                    obsm.insert(name, emb);
                }
                Err(e) => warn!("skipping obsm '{name}': {e}"),
            }
        }
    }
    Ok(Sidecars { obs, var, obsm })
}

/// Read X: a dense dataset or a CSR/CSC group.
fn read_x(file: &File) -> Result<MatrixData> {
    if let Ok(ds) = file.dataset("X") {
        let arr = ds.read_2d::<f64>().map_err(h5err)?;
        let rows: Vec<Vec<f64>> = arr.rows().into_iter().map(|r| r.to_vec()).collect();
        return Ok(MatrixData::Dense(rows));
    }

    if let Ok(group) = file.group("X") {
        let encoding = read_attr_str(&group, "encoding-type");
        let layout = match encoding.as_deref() {
            None => SparseLayout::Csr,
            Some(kind) => SparseLayout::from_encoding_type(kind).ok_or_else(|| {
                ScmergeError::Format(format!("unsupported X encoding-type: {kind}"))
            })?,
        };
        read_sparse_group(&group, layout)
    } else {
        Err(ScmergeError::Format("no X dataset or group found".into()))
    }
}

fn read_usize_1d(group: &Group, name: &str) -> Result<Vec<usize>> {
    let raw = group
        .dataset(name)
        .and_then(|ds| ds.read_1d::<i64>())
        .map_err(h5err)?;
    raw.iter()
        .map(|&v| {
            usize::try_from(v)
                .map_err(|_| ScmergeError::Format(format!("negative value {v} in '{name}'")))
        })
        .collect()
}

/// Read a compressed sparse group into a [`SparseMatrix`].
fn read_sparse_group(group: &Group, layout: SparseLayout) -> Result<MatrixData> {
    let data = group
        .dataset("data")
        .and_then(|ds| ds.read_1d::<f64>())
        .map_err(h5err)?
        .to_vec();
    let indices = read_usize_1d(group, "indices")?;
    let indptr = read_usize_1d(group, "indptr")?;

    let n_major = indptr.len().saturating_sub(1);
    let (n_rows, n_cols) = match group.attr("shape") {
        Ok(attr) => {
            let shape = attr.read_1d::<i64>().map_err(h5err)?;
            if shape.len() != 2 {
                return Err(ScmergeError::Format("sparse shape attribute must have 2 entries".into()));
            }
            (shape[0] as usize, shape[1] as usize)
        }
        Err(_) => {
            let n_minor = indices.iter().copied().max().map_or(0, |m| m + 1);
            match layout {
                SparseLayout::Csr => (n_major, n_minor),
                SparseLayout::Csc => (n_minor, n_major),
            }
        }
    };

    let sm = SparseMatrix::from_compressed(layout, data, indices, indptr, n_rows, n_cols)?;
    Ok(MatrixData::Sparse(sm))
}

/// Write a matrix under `name`: a dense dataset or a compressed sparse group.
fn write_matrix(parent: &Group, name: &str, matrix: &MatrixData) -> Result<()> {
    match matrix {
        MatrixData::Dense(rows) => {
            let n_rows = rows.len();
            let n_cols = rows.first().map_or(0, |r| r.len());
            let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
            let arr = ndarray::Array2::from_shape_vec((n_rows, n_cols), flat)
                .map_err(|e| ScmergeError::InvalidInput(format!("shape error: {e}")))?;
            let ds = parent
                .new_dataset_builder()
                .with_data(&arr)
                .create(name)
                .map_err(h5err)?;
            write_encoding!(ds, "array", "0.2.0")?;
        }
        MatrixData::Sparse(sm) => {
            let (n_rows, n_cols) = sm.shape();
            let group = parent.create_group(name).map_err(h5err)?;
            write_encoding!(group, sm.layout().encoding_type(), "0.1.0")?;

            let shape_arr = ndarray::arr1(&[n_rows as i64, n_cols as i64]);
            group
                .new_attr_builder()
                .with_data(&shape_arr)
                .create("shape")
                .map_err(h5err)?;

            let data_arr = ndarray::Array1::from(sm.data().to_vec());
            group
                .new_dataset_builder()
                .with_data(&data_arr)
                .create("data")
                .map_err(h5err)?;

            for (key, values) in [("indices", sm.indices()), ("indptr", sm.indptr())] {
                let arr =
                    ndarray::Array1::from(values.iter().map(|&v| v as i64).collect::<Vec<_>>());
                group
                    .new_dataset_builder()
                    .with_data(&arr)
                    .create(key)
                    .map_err(h5err)?;
            }
        }
    }
    Ok(())
}

fn read_frame_or_default(file: &File, name: &str, expected: usize) -> Result<Table> {
    if !file.link_exists(name) {
        // No group: positional names
        return Ok(Table::new((0..expected).map(|i| format!("{i}")).collect()));
    }
    let group = file.group(name).map_err(h5err)?;
    read_frame(&group)
}

/// Read the index dataset named by a dataframe group's `_index` attribute.
fn read_frame_index(group: &Group) -> Result<Vec<String>> {
    let index_name = read_attr_str(group, "_index").unwrap_or_else(|| "_index".to_string());
    read_strings(group, &index_name)
}

fn read_strings(group: &Group, name: &str) -> Result<Vec<String>> {
    let ds = group.dataset(name).map_err(h5err)?;
    Ok(ds
        .read_1d::<VarLenUnicode>()
        .map_err(h5err)?
        .iter()
        .map(|s| s.as_str().to_string())
        .collect())
}

/// Column names of a dataframe group: `column-order` when present, otherwise
/// every member except the index.
fn frame_column_names(group: &Group, index_name: &str) -> Result<Vec<String>> {
    if let Ok(attr) = group.attr("column-order") {
        // An empty column-order may be stored with a non-string dtype.
        if attr.size() == 0 {
            return Ok(Vec::new());
        }
        let names = attr.read_1d::<VarLenUnicode>().map_err(h5err)?;
        return Ok(names.iter().map(|s| s.as_str().to_string()).collect());
    }
    Ok(group
        .member_names()
        .map_err(h5err)?
        .into_iter()
        .filter(|n| n != index_name && n != "__categories")
        .collect())
}

/// Read a dataframe group into a [`Table`].
fn read_frame(group: &Group) -> Result<Table> {
    let index_name = read_attr_str(group, "_index").unwrap_or_else(|| "_index".to_string());
    let index = read_strings(group, &index_name)?;
    let mut table = Table::new(index);
    for name in frame_column_names(group, &index_name)? {
        match read_column(group, &name) {
            Ok(col) => table.insert(&name, col)?,
            Err(e) => warn!("skipping column '{name}': {e}"),
        }
    }
    Ok(table)
}

/// Read one dataframe column: a categorical group or a 1D dataset.
fn read_column(group: &Group, name: &str) -> Result<ColumnData> {
    if let Ok(cat) = group.group(name) {
        let categories = read_strings(&cat, "categories")?;
        let codes: Vec<i32> = cat
            .dataset("codes")
            .and_then(|ds| ds.read_1d::<i32>())
            .map_err(h5err)?
            .to_vec();
        return Ok(ColumnData::Categorical { codes, categories });
    }

    let ds = group.dataset(name).map_err(h5err)?;
    let descriptor = ds
        .dtype()
        .and_then(|t| t.to_descriptor())
        .map_err(h5err)?;
    match descriptor {
        TypeDescriptor::Boolean => {
            let arr = ds.read_1d::<bool>().map_err(h5err)?;
            Ok(ColumnData::Boolean(arr.iter().map(|&b| Some(b)).collect()))
        }
        TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii => {
            let arr = ds.read_1d::<VarLenUnicode>().map_err(h5err)?;
            Ok(ColumnData::Strings(arr.iter().map(|s| s.as_str().to_string()).collect()))
        }
        TypeDescriptor::Float(_) | TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
            let arr = ds.read_1d::<f64>().map_err(h5err)?;
            Ok(ColumnData::Numeric(arr.to_vec()))
        }
        other => Err(ScmergeError::Format(format!(
            "unsupported column type {other:?} for '{name}'"
        ))),
    }
}

/// Write a [`Table`] as a dataframe group.
fn write_frame(group: &Group, table: &Table) -> Result<()> {
    write_encoding!(group, "dataframe", "0.2.0")?;
    write_attr_str!(group, "_index", "_index")?;
    let order: Vec<String> = table.column_names().iter().map(|s| s.to_string()).collect();
    group
        .new_attr_builder()
        .with_data(&unicode_array(&order)?)
        .create("column-order")
        .map_err(h5err)?;

    write_string_dataset(group, "_index", table.index())?;
    for (name, col) in table.columns() {
        write_column(group, name, col)?;
    }
    Ok(())
}

fn write_string_dataset(group: &Group, name: &str, values: &[String]) -> Result<()> {
    let ds = group
        .new_dataset_builder()
        .with_data(&unicode_array(values)?)
        .create(name)
        .map_err(h5err)?;
    write_encoding!(ds, "string-array", "0.2.0")
}

/// Write one dataframe column.
fn write_column(group: &Group, name: &str, col: &ColumnData) -> Result<()> {
    match col {
        ColumnData::Strings(vals) => write_string_dataset(group, name, vals)?,
        ColumnData::Numeric(vals) => {
            let ds = group
                .new_dataset_builder()
                .with_data(&ndarray::Array1::from(vals.clone()))
                .create(name)
                .map_err(h5err)?;
            write_encoding!(ds, "array", "0.2.0")?;
        }
        ColumnData::Boolean(vals) => {
            let arr: ndarray::Array1<bool> = vals.iter().map(|b| b.unwrap_or(false)).collect();
            let ds = group
                .new_dataset_builder()
                .with_data(&arr)
                .create(name)
                .map_err(h5err)?;
            write_encoding!(ds, "array", "0.2.0")?;
        }
        ColumnData::Categorical { codes, categories } => {
            let cat = group.create_group(name).map_err(h5err)?;
            write_encoding!(cat, "categorical", "0.2.0")?;
            cat.new_attr::<bool>()
                .create("ordered")
                .and_then(|attr| attr.write_scalar(&false))
                .map_err(h5err)?;
            cat.new_dataset_builder()
                .with_data(&ndarray::Array1::from(codes.clone()))
                .create("codes")
                .map_err(h5err)?;
            write_string_dataset(&cat, "categories", categories)?;
        }
    }
    Ok(())
}

/// Read an `obsm` entry: a 2D array or a dataframe of numeric columns.
fn read_embedding(group: &Group, name: &str) -> Result<Embedding> {
    if let Ok(frame) = group.group(name) {
        let table = read_frame(&frame)?;
        let mut columns = Vec::with_capacity(table.n_columns());
        let mut by_column = Vec::with_capacity(table.n_columns());
        for (col_name, col) in table.columns() {
            let values = col.as_numeric().ok_or_else(|| {
                ScmergeError::Format(format!("obsm '{name}' column '{col_name}' is not numeric"))
            })?;
            columns.push(col_name.to_string());
            by_column.push(values.clone());
        }
        let rows = (0..table.len())
            .map(|r| by_column.iter().map(|c| c[r]).collect())
            .collect();
        return Embedding::frame(rows, columns);
    }

    let ds = group.dataset(name).map_err(h5err)?;
    let arr = ds.read_2d::<f64>().map_err(h5err)?;
    Ok(Embedding::array(
        arr.rows().into_iter().map(|r| r.to_vec()).collect(),
    ))
}

/// Write an `obsm` entry: dataframes as dataframe groups, arrays as 2D datasets.
fn write_embedding(group: &Group, name: &str, emb: &Embedding, obs_names: &[String]) -> Result<()> {
    if let Some(columns) = emb.stored_columns() {
        let mut table = Table::new(obs_names.to_vec());
        for (j, col_name) in columns.iter().enumerate() {
            let values = emb.values().iter().map(|r| r[j]).collect();
            table.insert(col_name, ColumnData::Numeric(values))?;
        }
        let frame = group.create_group(name).map_err(h5err)?;
        return write_frame(&frame, &table);
    }

    let n_rows = emb.n_rows();
    let n_cols = emb.n_cols();
    let flat: Vec<f64> = emb.values().iter().flat_map(|r| r.iter().copied()).collect();
    let arr = ndarray::Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| ScmergeError::InvalidInput(format!("embedding shape error: {e}")))?;
    let ds = group
        .new_dataset_builder()
        .with_data(&arr)
        .create(name)
        .map_err(h5err)?;
    write_encoding!(ds, "array", "0.2.0")
}

fn read_uns(file: &File) -> Result<BTreeMap<String, UnsValue>> {
    if !file.link_exists("uns") {
        return Ok(BTreeMap::new());
    }
    let group = file.group("uns").map_err(h5err)?;
    read_uns_dict(&group, "uns")
}

/// Read every child of a `dict` group. Entries with an unsupported shape,
/// dtype, or encoding are skipped with a warning.
fn read_uns_dict(group: &Group, path: &str) -> Result<BTreeMap<String, UnsValue>> {
    let mut entries = BTreeMap::new();
    for name in group.member_names().map_err(h5err)? {
        let child_path = format!("{path}/{name}");
        if let Ok(child) = group.group(&name) {
            match read_attr_str(&child, "encoding-type").as_deref() {
                None | Some("dict") => {
                    entries.insert(name, UnsValue::Dict(read_uns_dict(&child, &child_path)?));
                }
                Some(kind) => warn!("dropping '{child_path}': unsupported encoding-type {kind}"),
            }
            continue;
        }
        match group
            .dataset(&name)
            .map_err(h5err)
            .and_then(|ds| read_uns_value(&ds))
        {
            Ok(value) => {
                entries.insert(name, value);
            }
            Err(e) => warn!("dropping '{child_path}': {e}"),
        }
    }
    Ok(entries)
}

fn read_uns_value(ds: &hdf5::Dataset) -> Result<UnsValue> {
    let descriptor = ds
        .dtype()
        .and_then(|t| t.to_descriptor())
        .map_err(h5err)?;
    match (ds.ndim(), descriptor) {
        (0, TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii) => {
            let s = ds.read_scalar::<VarLenUnicode>().map_err(h5err)?;
            Ok(UnsValue::String(s.as_str().to_string()))
        }
        (0, TypeDescriptor::Boolean) => Ok(UnsValue::Bool(ds.read_scalar::<bool>().map_err(h5err)?)),
        (0, TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_)) => {
            Ok(UnsValue::Int(ds.read_scalar::<i64>().map_err(h5err)?))
        }
        (0, TypeDescriptor::Float(_)) => Ok(UnsValue::Float(ds.read_scalar::<f64>().map_err(h5err)?)),
        (1, TypeDescriptor::VarLenUnicode | TypeDescriptor::VarLenAscii) => {
            let arr = ds.read_1d::<VarLenUnicode>().map_err(h5err)?;
            Ok(UnsValue::Strings(arr.iter().map(|s| s.as_str().to_string()).collect()))
        }
        (1, TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_)) => {
            Ok(UnsValue::Ints(ds.read_1d::<i64>().map_err(h5err)?.to_vec()))
        }
        (1, TypeDescriptor::Float(_)) => {
            Ok(UnsValue::Floats(ds.read_1d::<f64>().map_err(h5err)?.to_vec()))
        }
        (ndim, other) => Err(ScmergeError::Format(format!(
            "unsupported {ndim}-d {other:?} value"
        ))),
    }
}

macro_rules! write_scalar_dataset {
    ($group:expr, $name:expr, $ty:ty, $val:expr) => {{
        let ds = $group
            .new_dataset::<$ty>()
            .shape(())
            .create($name)
            .map_err(h5err)?;
        ds.write_scalar($val).map_err(h5err)?;
        ds
    }};
}

fn write_uns_dict(group: &Group, entries: &BTreeMap<String, UnsValue>) -> Result<()> {
    write_encoding!(group, "dict", "0.1.0")?;
    for (name, value) in entries {
        write_uns_value(group, name, value)?;
    }
    Ok(())
}

fn write_uns_value(group: &Group, name: &str, value: &UnsValue) -> Result<()> {
    let ds = match value {
        UnsValue::Dict(entries) => {
            let child = group.create_group(name).map_err(h5err)?;
            return write_uns_dict(&child, entries);
        }
        UnsValue::String(s) => write_scalar_dataset!(group, name, VarLenUnicode, &unicode(s)?),
        UnsValue::Bool(b) => write_scalar_dataset!(group, name, bool, b),
        UnsValue::Int(i) => write_scalar_dataset!(group, name, i64, i),
        UnsValue::Float(f) => write_scalar_dataset!(group, name, f64, f),
        UnsValue::Strings(v) => group
            .new_dataset_builder()
            .with_data(&unicode_array(v)?)
            .create(name)
            .map_err(h5err)?,
        UnsValue::Ints(v) => group
            .new_dataset_builder()
            .with_data(&ndarray::Array1::from(v.clone()))
            .create(name)
            .map_err(h5err)?,
        UnsValue::Floats(v) => group
            .new_dataset_builder()
            .with_data(&ndarray::Array1::from(v.clone()))
            .create(name)
            .map_err(h5err)?,
    };
    write_encoding!(ds, value.encoding_type(), value.encoding_version())
}

/// Top-level members with no counterpart in [`Dataset`].
fn warn_unsupported_members(file: &File) -> Result<()> {
    for name in file.member_names().map_err(h5err)? {
        if !KNOWN_ELEMENTS.contains(&name.as_str()) {
            warn!("dropping unsupported element '{name}'");
        }
    }
    Ok(())
}
