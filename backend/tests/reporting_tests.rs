//! Movement export tests

mod support;

use shared::{MovementLine, Role};
use stock_backend::services::ledger::MovementQuery;
use stock_backend::services::{LedgerService, ReportingService};

use support::Harness;

#[tokio::test]
async fn test_movement_csv_export() {
    let h = Harness::new();
    let product = h.product(10).await;
    let clerk = h.user(Role::DataEntry);
    let ledger = LedgerService::new(h.ctx.clone());
    ledger
        .direct_replenish(&clerk, product.id, 5, None)
        .await
        .unwrap();
    ledger
        .direct_disburse(
            &clerk,
            h.structure.id,
            &[MovementLine {
                product_id: product.id,
                quantity: 3,
                unit_price: None,
            }],
        )
        .await
        .unwrap();

    let reporting = ReportingService::new(h.ctx.clone());
    let csv = reporting
        .export_movements_csv(&clerk, &MovementQuery::default())
        .await
        .unwrap();

    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "date,product_id,product_name,unit,direction,quantity,signed_quantity,structure_id,source,request_id"
    );
    assert!(lines.iter().skip(1).all(|l| l.contains(&product.name)));
    assert!(lines.iter().any(|l| l.contains(",OUT,3,-3,")));
    assert!(lines.iter().any(|l| l.contains(",IN,5,5,")));
    assert!(lines.iter().skip(1).all(|l| l.contains(",DIRECT,")));
}

#[tokio::test]
async fn test_movement_report_hides_other_structures() {
    let h = Harness::new();
    let sibling = h.sibling.clone();
    let other = h.product_in(&sibling, 10).await;
    LedgerService::new(h.ctx.clone())
        .direct_replenish(&h.user_in(Role::DataEntry, &sibling), other.id, 2, None)
        .await
        .unwrap();

    let rows = ReportingService::new(h.ctx.clone())
        .movement_report(&h.user(Role::Director), &MovementQuery::default())
        .await
        .unwrap();

    assert!(rows.is_empty());
}
