//! Financial statement recognition over extracted tables.
//!
//! Each raw table is flattened to lowercase text and scored against four
//! keyword sets (Korean and English synonyms). A table belongs to a category
//! only when at least [`MIN_KEYWORD_HITS`] distinct keywords of that category
//! appear; incidental vocabulary such as a lone "매출" in a footnote table
//! does not qualify. The first table per category wins, later matches fall
//! through to `other_tables`.
//!
//! Recognised tables are reshaped into `years × metrics` with every value
//! cell run through [`parse_numeric`].

use crate::pipeline::numeral::parse_numeric;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Minimum number of distinct keywords a table must contain to be classified.
pub const MIN_KEYWORD_HITS: usize = 2;

/// Canonical financial statement categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCategory {
    IncomeStatement,
    BalanceSheet,
    CashFlow,
    CapTable,
}

impl TableCategory {
    /// All categories, in tie-break order.
    pub const ALL: [TableCategory; 4] = [
        TableCategory::IncomeStatement,
        TableCategory::BalanceSheet,
        TableCategory::CashFlow,
        TableCategory::CapTable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableCategory::IncomeStatement => "income_statement",
            TableCategory::BalanceSheet => "balance_sheet",
            TableCategory::CashFlow => "cash_flow",
            TableCategory::CapTable => "cap_table",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            TableCategory::IncomeStatement => &[
                "손익계산서",
                "매출액",
                "매출원가",
                "매출총이익",
                "영업이익",
                "당기순이익",
                "법인세",
                "income statement",
                "revenue",
                "sales",
                "cost of sales",
                "gross profit",
                "operating income",
                "net income",
            ],
            TableCategory::BalanceSheet => &[
                "재무상태표",
                "대차대조표",
                "자산총계",
                "부채총계",
                "자본총계",
                "유동자산",
                "비유동자산",
                "유동부채",
                "자본금",
                "이익잉여금",
                "balance sheet",
                "total assets",
                "total liabilities",
                "total equity",
                "current assets",
            ],
            TableCategory::CashFlow => &[
                "현금흐름표",
                "현금흐름",
                "영업활동",
                "투자활동",
                "재무활동",
                "현금및현금성자산",
                "기초현금",
                "기말현금",
                "cash flow",
                "operating activities",
                "investing activities",
                "financing activities",
            ],
            TableCategory::CapTable => &[
                "주주명부",
                "주주명",
                "주주",
                "지분율",
                "보통주",
                "우선주",
                "주식수",
                "발행주식",
                "shareholder",
                "ownership",
                "common shares",
                "preferred shares",
                "fully diluted",
            ],
        }
    }

    /// Distinct keywords of this category found in `text`.
    ///
    /// A keyword only counts where it is not part of a longer keyword of
    /// the same set, so `현금흐름표` is one hit, not two.
    fn keyword_hits(&self, text: &str) -> usize {
        let keywords = self.keywords();
        keywords
            .iter()
            .filter(|k| {
                text.match_indices(*k).any(|(start, m)| {
                    let end = start + m.len();
                    !keywords.iter().any(|longer| {
                        longer.len() > k.len()
                            && longer.contains(*k)
                            && text
                                .match_indices(*longer)
                                .any(|(s, l)| s <= start && end <= s + l.len())
                    })
                })
            })
            .count()
    }
}

/// A table as it came out of a page: rows of cell strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    /// 1-based page number the table was found on.
    pub page: usize,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(page: usize, rows: Vec<Vec<String>>) -> Self {
        Self { page, rows }
    }

    fn flattened_lowercase(&self) -> String {
        self.rows
            .iter()
            .flatten()
            .map(|c| c.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A canonical financial statement, or the marker that none was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTable {
    pub category: TableCategory,
    pub found: bool,
    pub page: usize,
    /// Column labels after the row-label column, usually fiscal years.
    pub years: Vec<String>,
    /// Metric name → one value per entry of `years`.
    pub metrics: BTreeMap<String, Vec<Option<f64>>>,
    /// The original rows.
    pub raw: Vec<Vec<String>>,
}

impl FinancialTable {
    /// Placeholder for a category with no matching table.
    pub fn missing(category: TableCategory) -> Self {
        Self {
            category,
            found: false,
            page: 0,
            years: Vec::new(),
            metrics: BTreeMap::new(),
            raw: Vec::new(),
        }
    }

    /// Reshape a raw table into years × metrics.
    pub fn from_raw(category: TableCategory, table: &RawTable) -> Self {
        let header_idx = table
            .rows
            .iter()
            .position(|row| row.iter().any(|c| is_period_label(c)))
            .unwrap_or(0);

        let years: Vec<String> = table
            .rows
            .get(header_idx)
            .map(|row| row.iter().skip(1).map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();

        let mut metrics = BTreeMap::new();
        for row in table.rows.iter().skip(header_idx + 1) {
            let Some(label) = row.first().map(|c| c.trim()) else {
                continue;
            };
            if label.is_empty() || metrics.contains_key(label) {
                continue;
            }
            let mut values: Vec<Option<f64>> =
                row.iter().skip(1).map(|c| parse_numeric(c)).collect();
            values.resize(years.len(), None);
            metrics.insert(label.to_string(), values);
        }

        Self {
            category,
            found: true,
            page: table.page,
            years,
            metrics,
            raw: table.rows.clone(),
        }
    }
}

/// Outcome of running the extractor over a set of tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialExtraction {
    pub income_statement: FinancialTable,
    pub balance_sheet: FinancialTable,
    pub cash_flow: FinancialTable,
    pub cap_table: FinancialTable,
    pub other_tables: Vec<RawTable>,
}

impl FinancialExtraction {
    pub fn get(&self, category: TableCategory) -> &FinancialTable {
        match category {
            TableCategory::IncomeStatement => &self.income_statement,
            TableCategory::BalanceSheet => &self.balance_sheet,
            TableCategory::CashFlow => &self.cash_flow,
            TableCategory::CapTable => &self.cap_table,
        }
    }

    fn slot(&mut self, category: TableCategory) -> &mut FinancialTable {
        match category {
            TableCategory::IncomeStatement => &mut self.income_statement,
            TableCategory::BalanceSheet => &mut self.balance_sheet,
            TableCategory::CashFlow => &mut self.cash_flow,
            TableCategory::CapTable => &mut self.cap_table,
        }
    }

    /// Only the categories that were found.
    pub fn found(&self) -> BTreeMap<TableCategory, FinancialTable> {
        TableCategory::ALL
            .iter()
            .map(|c| self.get(*c))
            .filter(|t| t.found)
            .map(|t| (t.category, t.clone()))
            .collect()
    }
}

/// Keyword-based financial table classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinancialTableExtractor;

impl FinancialTableExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Category a table belongs to, if any.
    ///
    /// The category with the most distinct keyword hits wins; ties go to the
    /// earlier entry of [`TableCategory::ALL`].
    pub fn classify(&self, table: &RawTable) -> Option<TableCategory> {
        let text = table.flattened_lowercase();
        let mut best: Option<(TableCategory, usize)> = None;
        for category in TableCategory::ALL {
            let hits = category.keyword_hits(&text);
            if hits >= MIN_KEYWORD_HITS && best.is_none_or(|(_, h)| hits > h) {
                best = Some((category, hits));
            }
        }
        best.map(|(c, _)| c)
    }

    pub fn extract(&self, tables: &[RawTable]) -> FinancialExtraction {
        let mut out = FinancialExtraction {
            income_statement: FinancialTable::missing(TableCategory::IncomeStatement),
            balance_sheet: FinancialTable::missing(TableCategory::BalanceSheet),
            cash_flow: FinancialTable::missing(TableCategory::CashFlow),
            cap_table: FinancialTable::missing(TableCategory::CapTable),
            other_tables: Vec::new(),
        };

        for table in tables {
            match self.classify(table) {
                Some(category) if !out.get(category).found => {
                    debug!(
                        "Page {}: table classified as {}",
                        table.page,
                        category.as_str()
                    );
                    *out.slot(category) = FinancialTable::from_raw(category, table);
                }
                _ => out.other_tables.push(table.clone()),
            }
        }
        out
    }
}

static RE_PERIOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(fy\s*)?(19|20)\d{2}(년|\.\d{1,2}(\.\d{1,2})?|[a-z]?)?$|^제\s*\d+\s*기")
        .unwrap()
});

/// `2023`, `2023년`, `FY2023`, `2023.12`, `2024E`, `제12기`.
fn is_period_label(cell: &str) -> bool {
    RE_PERIOD.is_match(cell.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn income_table(page: usize) -> RawTable {
        RawTable::new(
            page,
            rows(&[
                &["과목", "2022년", "2023년"],
                &["매출액", "5억2천만", "1,234,000,000"],
                &["영업이익", "△3억2천만", "-"],
                &["당기순이익", "(1,200)", "N/A"],
            ]),
        )
    }

    #[test]
    fn classifies_income_statement() {
        let ex = FinancialTableExtractor::new();
        assert_eq!(
            ex.classify(&income_table(1)),
            Some(TableCategory::IncomeStatement)
        );
    }

    #[test]
    fn single_keyword_is_not_enough() {
        let ex = FinancialTableExtractor::new();
        let t = RawTable::new(1, rows(&[&["항목", "값"], &["매출액", "100"]]));
        assert_eq!(ex.classify(&t), None);
    }

    #[test]
    fn nested_keyword_counts_once() {
        let ex = FinancialTableExtractor::new();
        let cases = [
            rows(&[&["현금흐름표 참조", "비고"], &["별첨", "-"]]),
            rows(&[&["주주명", "연락처"], &["홍길동", "010-0000-0000"]]),
            rows(&[&["item", "cost of sales"], &["note", "see above"]]),
            rows(&[&["비유동자산", "주석"], &["토지", "3"]]),
        ];
        for table in cases {
            assert_eq!(ex.classify(&RawTable::new(1, table.clone())), None, "{table:?}");
        }
    }

    #[test]
    fn cross_reference_does_not_take_the_slot() {
        let ex = FinancialTableExtractor::new();
        let reference = RawTable::new(1, rows(&[&["현금흐름표 참조", "비고"], &["별첨", "-"]]));
        let statement = RawTable::new(
            3,
            rows(&[
                &["현금흐름표", "2023"],
                &["영업활동으로 인한 현금흐름", "1,000"],
                &["투자활동으로 인한 현금흐름", "(300)"],
            ]),
        );
        let out = ex.extract(&[reference, statement]);
        assert!(out.cash_flow.found);
        assert_eq!(out.cash_flow.page, 3);
        assert_eq!(out.other_tables.len(), 1);
    }

    #[test]
    fn separate_occurrences_still_count() {
        let ex = FinancialTableExtractor::new();
        let t = RawTable::new(1, rows(&[&["", "2023"], &["비유동자산", "10"], &["유동자산", "5"]]));
        assert_eq!(ex.classify(&t), Some(TableCategory::BalanceSheet));
    }

    #[test]
    fn english_keywords_case_insensitive() {
        let ex = FinancialTableExtractor::new();
        let t = RawTable::new(
            2,
            rows(&[
                &["", "FY2023"],
                &["Total Assets", "1,000"],
                &["Total Liabilities", "400"],
            ]),
        );
        assert_eq!(ex.classify(&t), Some(TableCategory::BalanceSheet));
    }

    #[test]
    fn reshapes_into_years_and_metrics() {
        let t = FinancialTable::from_raw(TableCategory::IncomeStatement, &income_table(3));
        assert!(t.found);
        assert_eq!(t.page, 3);
        assert_eq!(t.years, vec!["2022년", "2023년"]);
        assert_eq!(
            t.metrics["매출액"],
            vec![Some(520_000_000.0), Some(1_234_000_000.0)]
        );
        assert_eq!(t.metrics["영업이익"], vec![Some(-320_000_000.0), None]);
        assert_eq!(t.metrics["당기순이익"], vec![Some(-1200.0), None]);
        assert_eq!(t.raw.len(), 4);
    }

    #[test]
    fn header_found_below_title_row() {
        let t = RawTable::new(
            1,
            rows(&[
                &["손익계산서", "", ""],
                &["(단위: 원)", "제11기", "제12기"],
                &["매출액", "100", "200"],
            ]),
        );
        let ft = FinancialTable::from_raw(TableCategory::IncomeStatement, &t);
        assert_eq!(ft.years, vec!["제11기", "제12기"]);
        assert_eq!(ft.metrics["매출액"], vec![Some(100.0), Some(200.0)]);
        assert!(!ft.metrics.contains_key("손익계산서"));
    }

    #[test]
    fn short_rows_are_padded() {
        let t = RawTable::new(
            1,
            rows(&[&["", "2022", "2023"], &["매출액", "10"], &["영업이익"]]),
        );
        let ft = FinancialTable::from_raw(TableCategory::IncomeStatement, &t);
        assert_eq!(ft.metrics["매출액"], vec![Some(10.0), None]);
        assert_eq!(ft.metrics["영업이익"], vec![None, None]);
    }

    #[test]
    fn first_table_per_category_wins() {
        let ex = FinancialTableExtractor::new();
        let cap = RawTable::new(
            5,
            rows(&[
                &["주주명", "보통주", "지분율"],
                &["홍길동", "1,000주", "50%"],
            ]),
        );
        let out = ex.extract(&[income_table(2), income_table(4), cap]);

        assert!(out.income_statement.found);
        assert_eq!(out.income_statement.page, 2);
        assert!(out.cap_table.found);
        assert_eq!(out.cap_table.metrics["홍길동"], vec![Some(1000.0), Some(50.0)]);
        assert!(!out.balance_sheet.found);
        assert!(!out.cash_flow.found);
        assert_eq!(out.other_tables.len(), 1);
        assert_eq!(out.other_tables[0].page, 4);
        assert_eq!(out.found().len(), 2);
    }

    #[test]
    fn period_labels() {
        for label in ["2023", "2023년", "FY2023", "fy 2024", "2023.12", "2024E", "제12기"] {
            assert!(is_period_label(label), "{label}");
        }
        for label in ["매출액", "12345", "1,000"] {
            assert!(!is_period_label(label), "{label}");
        }
    }
}
