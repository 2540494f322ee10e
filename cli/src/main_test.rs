use super::*;

#[test]
fn item_argument_allows_colons_in_name() {
    let item = parse_item("Coffee: large:3.5:2").unwrap();
    assert_eq!(item.item_name, "Coffee: large");
    assert!((item.item_price - 3.5).abs() < f64::EPSILON);
    assert_eq!(item.item_quantity, 2);
}

#[test]
fn item_argument_rejects_missing_fields() {
    assert!(parse_item("Milk:2.5").is_err());
    assert!(parse_item("Milk:cheap:1").is_err());
}

#[test]
fn payment_argument_splits_on_equals() {
    assert_eq!(parse_payment("bob=12.5").unwrap(), ("bob".to_owned(), 12.5));
    assert!(parse_payment("bob").is_err());
}

#[test]
fn nested_commands_parse() {
    let cli = Cli::try_parse_from(["finboard", "--store", "/tmp/s.json", "budgets", "upsert", "2025-03", "c1", "250"])
        .unwrap();
    assert_eq!(cli.store, PathBuf::from("/tmp/s.json"));
    assert!(matches!(cli.command, Command::Budgets(BudgetCommand::Upsert { limit, .. }) if (limit - 250.0).abs() < f64::EPSILON));
}
