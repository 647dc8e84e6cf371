//! TiDB DDL extensions stripped before the MySQL path

use std::sync::LazyLock;

use regex::Regex;

/// `/*T![feature] ... */` version comments
static FEATURE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*T!\[[^\]]*\].*?\*/").expect("Invalid regex"));

static AUTO_RANDOM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bAUTO_RANDOM\b(\s*\(\s*\d+(\s*,\s*\d+)?\s*\))?").expect("Invalid regex")
});

static TABLE_OPTIONS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SHARD_ROW_ID_BITS|PRE_SPLIT_REGIONS|AUTO_ID_CACHE)\s*=?\s*\d+")
        .expect("Invalid regex")
});

/// Remove TiDB-only syntax so the statement parses as MySQL
pub fn strip_tidb_extensions(sql: &str) -> String {
    let sql = FEATURE_COMMENT.replace_all(sql, "");
    let sql = AUTO_RANDOM.replace_all(&sql, "");
    let sql = TABLE_OPTIONS.replace_all(&sql, "");
    sql.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_strips_clustered_index_comment() {
        let sql = "CREATE TABLE t (id BIGINT, PRIMARY KEY (id) /*T![clustered_index] CLUSTERED */)";
        assert_eq!(
            squash(&strip_tidb_extensions(sql)),
            "CREATE TABLE t (id BIGINT, PRIMARY KEY (id) )"
        );
    }

    #[test]
    fn test_strips_auto_random() {
        let sql = "CREATE TABLE t (id BIGINT AUTO_RANDOM(5) PRIMARY KEY, v INT)";
        assert_eq!(
            squash(&strip_tidb_extensions(sql)),
            "CREATE TABLE t (id BIGINT PRIMARY KEY, v INT)"
        );
        let sql = "id bigint /*T![auto_rand] AUTO_RANDOM(5) */ NOT NULL";
        assert_eq!(squash(&strip_tidb_extensions(sql)), "id bigint NOT NULL");
    }

    #[test]
    fn test_strips_table_options() {
        let sql = "CREATE TABLE t (id INT) ENGINE=InnoDB SHARD_ROW_ID_BITS=4 PRE_SPLIT_REGIONS=2";
        assert_eq!(
            squash(&strip_tidb_extensions(sql)),
            "CREATE TABLE t (id INT) ENGINE=InnoDB"
        );
    }

    #[test]
    fn test_plain_mysql_untouched() {
        let sql = "CREATE TABLE t (id INT NOT NULL) ENGINE=InnoDB";
        assert_eq!(strip_tidb_extensions(sql), sql);
    }
}
