use pbir_dax::{rewrite_expression, ColumnMap, TableMap};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn tables(pairs: &[(&str, &str)]) -> TableMap {
    pairs.iter().copied().collect()
}

#[test]
fn quoted_table_stays_quoted() {
    let map = tables(&[("Old Table", "New Table")]);
    assert_eq!(
        rewrite_expression("'Old Table'[Col]", Some(&map), None),
        "'New Table'[Col]"
    );
}

#[test]
fn bare_table_stays_bare() {
    let map = tables(&[("OldTable", "NewTable")]);
    assert_eq!(
        rewrite_expression("OldTable[Col]", Some(&map), None),
        "NewTable[Col]"
    );
}

#[test]
fn bare_table_renamed_to_spaced_name_gets_quoted() {
    let map = tables(&[("OldTable", "New Table")]);
    assert_eq!(
        rewrite_expression("OldTable[Col]", Some(&map), None),
        "'New Table'[Col]"
    );
}

#[test]
fn both_passes_in_one_call_use_the_new_table_name() {
    let map = tables(&[("T", "Sales Data")]);
    let mut columns = ColumnMap::new();
    columns.insert("Sales Data", "Amt", "Amount");

    assert_eq!(
        rewrite_expression(
            "SUMX(T, T[Amt]) + CALCULATE([Total], T[Amt] > 0)",
            Some(&map),
            Some(&columns)
        ),
        "SUMX('Sales Data', 'Sales Data'[Amount]) + CALCULATE([Total], 'Sales Data'[Amount] > 0)"
    );
}

#[test]
fn measure_brackets_and_strings_are_left_alone() {
    let map = tables(&[("Sales", "Revenue")]);
    assert_eq!(
        rewrite_expression(
            r#"IF([Sales] > 0, "Sales", Sales[Qty])"#,
            Some(&map),
            None
        ),
        r#"IF([Sales] > 0, "Sales", Revenue[Qty])"#
    );
}

proptest! {
    #[test]
    fn empty_maps_are_the_identity(expr in ".{0,64}") {
        let empty_tables = TableMap::new();
        let empty_columns = ColumnMap::new();
        prop_assert_eq!(
            rewrite_expression(&expr, Some(&empty_tables), Some(&empty_columns)),
            expr.clone()
        );
        prop_assert_eq!(rewrite_expression(&expr, None, None), expr);
    }

    #[test]
    fn unmatched_maps_are_the_identity(expr in "[A-Za-z_ \\[\\]'()+*0-9]{0,48}") {
        let map = tables(&[("ZzUnusedTable", "Other")]);
        let mut columns = ColumnMap::new();
        columns.insert("ZzUnusedTable", "Col", "Other");
        prop_assert_eq!(rewrite_expression(&expr, Some(&map), Some(&columns)), expr);
    }
}
