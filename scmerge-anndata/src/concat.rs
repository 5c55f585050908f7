//! Horizontal concatenation of annotation features onto `X`.
//!
//! The appended block follows `X`'s representation: CSR stays CSR, CSC stays
//! CSC, dense stays dense. `var` gains two provenance flags,
//! `is_<feature_name>` for the original features and
//! `is_<annotation_feature_name>` for the appended ones, and both are total
//! afterwards.

use log::{debug, info};
use scmerge_core::{Result, ScmergeError};

use crate::config::ConcatConfig;
use crate::dataset::Dataset;
use crate::source::{AnnotationSource, AnnotationTable};
use crate::table::{ColumnData, Table};

/// Resolve `source` against `dataset` and append its features to `X`.
///
/// `obs`, `obsm`, and `uns` of the result are shared with `dataset`.
///
/// # Errors
///
/// - [`ScmergeError::Format`] if the source names a missing column or key
/// - [`ScmergeError::ShapeMismatch`] if the source's row count differs from `n_obs`
/// - [`ScmergeError::InvalidInput`] if both provenance flags would share a name,
///   or `var` already holds a non-boolean column named like the appended flag
pub fn concat_features(
    dataset: &Dataset,
    source: &AnnotationSource,
    config: &ConcatConfig,
) -> Result<Dataset> {
    let annotation_feature_name = source.feature_name(config);
    let table = source.resolve(dataset, config)?;
    info!(
        "appending {} features from {:?} to {} \u{00d7} {} matrix",
        table.n_cols(),
        source,
        dataset.n_obs(),
        dataset.n_vars()
    );
    concat_matrices(dataset, &table, &config.feature_name, &annotation_feature_name)
}

/// Append the columns of `table` to `dataset`'s matrix and extend `var`.
///
/// Feature ids already present in `var` are not deduplicated; a colliding
/// annotation column simply appears twice in the new `var` index.
pub fn concat_matrices(
    dataset: &Dataset,
    table: &AnnotationTable,
    feature_name: &str,
    annotation_feature_name: &str,
) -> Result<Dataset> {
    if table.n_rows() != dataset.n_obs() {
        return Err(ScmergeError::ShapeMismatch {
            context: "annotation table".into(),
            expected: dataset.n_obs(),
            found: table.n_rows(),
        });
    }
    let prev_flag = format!("is_{feature_name}");
    let new_flag = format!("is_{annotation_feature_name}");
    if prev_flag == new_flag {
        return Err(ScmergeError::InvalidInput(format!(
            "feature name and annotation feature name are both '{feature_name}'; \
             provenance flags must differ"
        )));
    }
    // The original-feature flag is overwritten below; the appended one is
    // stacked onto whatever var already holds under that name.
    if let Some(existing) = dataset.var().get(&new_flag) {
        if !existing.is_boolean() {
            return Err(ScmergeError::InvalidInput(format!(
                "var column '{new_flag}' exists and is not boolean; \
                 it cannot carry the provenance flag"
            )));
        }
    }

    let block = dataset.x().like(&table.values, table.n_cols());
    let x = dataset.x().hstack(&block)?;
    debug!(
        "concatenated matrix shape {:?} (sparse layout {:?})",
        x.shape(),
        x.sparse_layout()
    );

    let var = stack_var(dataset.var(), &table.columns, &prev_flag, &new_flag)?;

    Dataset::from_parts(
        x,
        dataset.obs_shared(),
        var,
        dataset.obsm_shared(),
        dataset.uns_shared(),
    )
}

/// Stack the original `var` (flagged `prev_flag`) over the new feature ids
/// (flagged `new_flag`), then make every boolean column total.
fn stack_var(var: &Table, new_ids: &[String], prev_flag: &str, new_flag: &str) -> Result<Table> {
    let mut top = var.clone();
    top.insert(prev_flag, ColumnData::constant_bool(var.len(), true))?;

    let mut bottom = Table::new(new_ids.to_vec());
    bottom.insert(new_flag, ColumnData::constant_bool(new_ids.len(), true))?;

    let mut stacked = top.vstack(&bottom);

    // Both flags, plus every boolean column the original var carried.
    let bool_columns: Vec<String> = stacked
        .columns()
        .filter(|(name, col)| {
            col.is_boolean() || *name == prev_flag || *name == new_flag
        })
        .map(|(name, _)| name.to_string())
        .collect();
    for name in bool_columns {
        if let Some(col) = stacked.get_mut(&name) {
            col.fill_missing_bool(false);
        }
    }
    Ok(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Embedding;
    use crate::matrix::MatrixData;
    use crate::sparse::{SparseLayout, SparseMatrix};
    use crate::uns::UnsValue;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn flags(ds: &Dataset, name: &str) -> Vec<Option<bool>> {
        ds.var().get(name).unwrap().as_boolean().unwrap().clone()
    }

    fn celltype_dataset(x: MatrixData) -> Dataset {
        let mut ds = Dataset::new(x, Table::new(ids(&["0", "1", "2"])), Table::new(ids(&["g1", "g2"])))
            .unwrap();
        ds.add_obs_column("celltype", ColumnData::Strings(ids(&["A", "B", "A"])))
            .unwrap();
        ds
    }

    #[test]
    fn dense_celltype_scenario() {
        let ds = celltype_dataset(MatrixData::Dense(vec![
            vec![1.0, 2.0],
            vec![3.0, 4.0],
            vec![5.0, 6.0],
        ]));
        let out = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        )
        .unwrap();

        assert_eq!(
            out.x(),
            &MatrixData::Dense(vec![
                vec![1.0, 2.0, 1.0, 0.0],
                vec![3.0, 4.0, 0.0, 1.0],
                vec![5.0, 6.0, 1.0, 0.0],
            ])
        );
        assert_eq!(out.var_names(), &["g1", "g2", "A", "B"]);
        let t = Some(true);
        let f = Some(false);
        assert_eq!(flags(&out, "is_gene"), vec![t, t, f, f]);
        assert_eq!(flags(&out, "is_celltype"), vec![f, f, t, t]);
    }

    #[test]
    fn passes_obs_obsm_uns_through() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_obsm("X_pca", Embedding::array(vec![vec![1.0]; 3])).unwrap();
        ds.add_uns("title", "shard".into());
        let out = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        )
        .unwrap();
        assert!(std::sync::Arc::ptr_eq(&ds.obs_shared(), &out.obs_shared()));
        assert!(std::sync::Arc::ptr_eq(&ds.obsm_shared(), &out.obsm_shared()));
        assert_eq!(out.get_uns("title").and_then(UnsValue::as_str), Some("shard"));
    }

    #[test]
    fn sparse_layouts_preserved() {
        for layout in [SparseLayout::Csr, SparseLayout::Csc] {
            let sm = SparseMatrix::from_dense(
                &[vec![1.0, 0.0], vec![0.0, 4.0], vec![5.0, 0.0]],
                2,
                layout,
            );
            let ds = celltype_dataset(MatrixData::Sparse(sm));
            let out = concat_features(
                &ds,
                &AnnotationSource::ObsLabels("celltype".into()),
                &ConcatConfig::default(),
            )
            .unwrap();
            assert_eq!(out.x().sparse_layout(), Some(layout));
            assert_eq!(out.x().shape(), (3, 4));
            assert_eq!(
                out.x().to_dense_rows(),
                vec![
                    vec![1.0, 0.0, 1.0, 0.0],
                    vec![0.0, 4.0, 0.0, 1.0],
                    vec![5.0, 0.0, 1.0, 0.0],
                ]
            );
        }
    }

    #[test]
    fn existing_boolean_columns_filled_false() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_var_column("highly_variable", ColumnData::Boolean(vec![Some(true), Some(false)]))
            .unwrap();
        ds.add_var_column("mean", ColumnData::Numeric(vec![0.5, 1.5])).unwrap();
        let out = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        )
        .unwrap();

        assert_eq!(
            flags(&out, "highly_variable"),
            vec![Some(true), Some(false), Some(false), Some(false)]
        );
        let mean = out.var().get("mean").unwrap().as_numeric().unwrap();
        assert!(mean[2].is_nan() && mean[3].is_nan());
        assert_eq!(
            out.var().column_names(),
            vec!["highly_variable", "mean", "is_gene", "is_celltype"]
        );
    }

    #[test]
    fn repeated_concat_keeps_flags_total() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_obs_column("batch", ColumnData::Strings(ids(&["x", "y", "y"])))
            .unwrap();
        let once = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        )
        .unwrap();
        let twice = concat_features(
            &once,
            &AnnotationSource::ObsLabels("batch".into()),
            &ConcatConfig::default(),
        )
        .unwrap();

        assert_eq!(twice.n_vars(), 6);
        for flag in ["is_gene", "is_celltype", "is_batch"] {
            assert!(flags(&twice, flag).iter().all(Option::is_some), "{flag} has gaps");
        }
        // the second call re-flags every earlier feature as a "gene"
        assert_eq!(flags(&twice, "is_gene")[..4], [Some(true); 4]);
        assert_eq!(flags(&twice, "is_celltype")[4..], [Some(false); 2]);
    }

    #[test]
    fn obsm_source_uses_celltype_flag() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_obsm("X_pca", Embedding::array(vec![vec![0.1], vec![0.2], vec![0.3]]))
            .unwrap();
        let out = concat_features(
            &ds,
            &AnnotationSource::Obsm("X_pca".into()),
            &ConcatConfig::default(),
        )
        .unwrap();
        assert_eq!(out.var_names(), &["g1", "g2", "0"]);
        assert_eq!(flags(&out, "is_celltype"), vec![Some(false), Some(false), Some(true)]);
        assert_eq!(out.x().get(2, 2), 0.3);
    }

    #[test]
    fn colliding_ids_pass_through() {
        let ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        let table = AnnotationTable {
            index: ids(&["0", "1", "2"]),
            columns: ids(&["g1"]),
            values: vec![vec![1.0]; 3],
        };
        let out = concat_matrices(&ds, &table, "gene", "extra").unwrap();
        assert_eq!(out.var_names(), &["g1", "g2", "g1"]);
        assert!(!out.var().has_unique_index());
    }

    #[test]
    fn same_flag_names_rejected() {
        let ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        let cfg = ConcatConfig {
            annotation_feature_name: Some("gene".into()),
            ..Default::default()
        };
        let r = concat_features(&ds, &AnnotationSource::ObsLabels("celltype".into()), &cfg);
        assert!(matches!(r, Err(ScmergeError::InvalidInput(_))));
    }

    #[test]
    fn non_boolean_flag_column_rejected() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_var_column("is_celltype", ColumnData::Numeric(vec![0.0, 1.0]))
            .unwrap();
        let r = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        );
        assert!(matches!(r, Err(ScmergeError::InvalidInput(msg)) if msg.contains("is_celltype")));
    }

    #[test]
    fn non_boolean_original_flag_overwritten() {
        let mut ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        ds.add_var_column("is_gene", ColumnData::Strings(ids(&["yes", "no"])))
            .unwrap();
        let out = concat_features(
            &ds,
            &AnnotationSource::ObsLabels("celltype".into()),
            &ConcatConfig::default(),
        )
        .unwrap();
        let t = Some(true);
        let f = Some(false);
        assert_eq!(flags(&out, "is_gene"), vec![t, t, f, f]);
        assert_eq!(flags(&out, "is_celltype"), vec![f, f, t, t]);
    }

    #[test]
    fn row_mismatch_is_fatal() {
        let ds = celltype_dataset(MatrixData::Dense(vec![vec![0.0, 0.0]; 3]));
        let table = AnnotationTable {
            index: ids(&["0"]),
            columns: ids(&["A"]),
            values: vec![vec![1.0]],
        };
        assert!(matches!(
            concat_matrices(&ds, &table, "gene", "celltype"),
            Err(ScmergeError::ShapeMismatch { expected: 3, found: 1, .. })
        ));
    }
}
