//! Identifier newtypes for datasets and pipelines.

use crate::newtype_string::define_ident_newtype;

define_ident_newtype! {
    /// Unique identifier of a dataset.
    ///
    /// Used as the raw table name (`raw.<id>`), the snapshot file stem and the
    /// transform unit file stem.
    pub struct DatasetId;
}

define_ident_newtype! {
    /// Name of a pipeline, i.e. an ordered group of templates.
    pub struct PipelineName;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert!(DatasetId::try_new("naturreservat").is_some());
        assert!(DatasetId::try_new("ds_01").is_some());
        assert!(PipelineName::try_new("ext_restr").is_some());
    }

    #[test]
    fn test_invalid_ids() {
        assert!(DatasetId::try_new("").is_none());
        assert!(DatasetId::try_new("drop table;").is_none());
        assert!(DatasetId::try_new("a-b").is_none());
        assert!(PipelineName::try_new("x.y").is_none());
    }

    #[test]
    fn test_deserialize_rejects_invalid() {
        let ok: Result<DatasetId, _> = serde_yaml::from_str("roads");
        assert_eq!(ok.unwrap(), "roads");

        let err: Result<DatasetId, _> = serde_yaml::from_str("\"bad id\"");
        assert!(err.is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut ids = vec![DatasetId::new("c"), DatasetId::new("a"), DatasetId::new("b")];
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
