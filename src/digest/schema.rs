//! Column names shared by the raw sources, the process tables and the archive.

pub const STAGE: &str = "环节";
pub const CATEGORY: &str = "异常类型";
pub const DESCRIPTION: &str = "异常描述";
pub const DETAIL: &str = "异常信息";
pub const SOURCE_NOTE: &str = "源表异常备注";

/// Note column as it appears in the raw daily files, before it becomes [`SOURCE_NOTE`].
pub const RAW_NOTE: &str = "异常备注";

pub const PRIORITY: &str = "优先级";
pub const PLAN: &str = "计划";
pub const OWNER: &str = "责任人";
pub const STATUS: &str = "异常修复";
pub const REMARK: &str = "备注";

pub const KEY_COLUMNS: [&str; 5] = [STAGE, CATEGORY, DESCRIPTION, DETAIL, SOURCE_NOTE];
pub const ANNOTATION_COLUMNS: [&str; 5] = [PRIORITY, PLAN, OWNER, STATUS, REMARK];

/// Raw fields read as text from every daily source.
pub const RAW_TEXT_COLUMNS: [&str; 4] = [CATEGORY, DESCRIPTION, DETAIL, RAW_NOTE];

pub fn fixed_columns() -> impl Iterator<Item = &'static str> {
    KEY_COLUMNS.into_iter().chain(ANNOTATION_COLUMNS)
}

pub fn is_fixed_column(name: &str) -> bool {
    fixed_columns().any(|c| c == name)
}

/// `(stage, category, description, detail, source note)`; always compared as text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BusinessKey(pub [String; 5]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_columns_keep_key_then_annotation_order() {
        let cols: Vec<&str> = fixed_columns().collect();
        assert_eq!(cols.len(), 10);
        assert_eq!(cols[0], STAGE);
        assert_eq!(cols[4], SOURCE_NOTE);
        assert_eq!(cols[5], PRIORITY);
        assert_eq!(cols[9], REMARK);
        assert!(is_fixed_column(STATUS));
        assert!(!is_fixed_column("12/25"));
    }
}
