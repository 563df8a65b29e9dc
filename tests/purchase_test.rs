mod common;

use anyhow::Result;
use coinshop::application::{ErrorKind, LedgerError, ShopService};
use coinshop::storage::{FailPoint, LedgerStore};
use common::{Shop, coins, memory_service, sqlite_service};

async fn purchase_succeeds<S: LedgerStore>(service: &ShopService<S>) -> Result<()> {
    Shop::create_catalog(service).await?;
    Shop::open_accounts(service, &[("alice", 100)]).await?;

    let purchase = service.buy("alice", "cup").await?;

    assert_eq!(purchase.item, "cup");
    assert_eq!(purchase.price, coins(20));
    assert_eq!(Shop::balance(service, "alice").await?, coins(80));

    let purchases = service.purchases("alice").await?;
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].id, purchase.id);
    assert_eq!(purchases[0].buyer, service.get_account("alice").await?.id);
    Ok(())
}

async fn insufficient_funds_changes_nothing<S: LedgerStore>(service: &ShopService<S>) -> Result<()> {
    Shop::create_catalog(service).await?;
    Shop::open_accounts(service, &[("alice", 10)]).await?;

    let err = service.buy("alice", "cup").await.unwrap_err();

    match err {
        LedgerError::InsufficientFunds {
            ref username,
            balance,
            required,
        } => {
            assert_eq!(username, "alice");
            assert_eq!(balance, coins(10));
            assert_eq!(required, coins(20));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(Shop::balance(service, "alice").await?, coins(10));
    assert!(service.purchases("alice").await?.is_empty());
    Ok(())
}

async fn unknown_buyer_is_not_found<S: LedgerStore>(service: &ShopService<S>) -> Result<()> {
    Shop::create_catalog(service).await?;
    Shop::open_accounts(service, &[("alice", 100)]).await?;

    let err = service.buy("ghost", "cup").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(err, LedgerError::AccountNotFound(ref name) if name == "ghost"));
    assert_eq!(Shop::total(service).await?, coins(100));
    Ok(())
}

#[tokio::test]
async fn test_purchase_succeeds_sqlite() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    purchase_succeeds(&service).await
}

#[tokio::test]
async fn test_purchase_succeeds_memory() -> Result<()> {
    purchase_succeeds(&memory_service()).await
}

#[tokio::test]
async fn test_insufficient_funds_sqlite() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    insufficient_funds_changes_nothing(&service).await
}

#[tokio::test]
async fn test_insufficient_funds_memory() -> Result<()> {
    insufficient_funds_changes_nothing(&memory_service()).await
}

#[tokio::test]
async fn test_unknown_buyer_sqlite() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    unknown_buyer_is_not_found(&service).await
}

#[tokio::test]
async fn test_unknown_buyer_memory() -> Result<()> {
    unknown_buyer_is_not_found(&memory_service()).await
}

#[tokio::test]
async fn test_unknown_item_is_not_found() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    Shop::create_catalog(&service).await?;
    Shop::open_accounts(&service, &[("alice", 100)]).await?;

    let err = service.buy("alice", "umbrella").await.unwrap_err();

    assert!(matches!(err, LedgerError::ItemNotFound(ref name) if name == "umbrella"));
    assert_eq!(Shop::balance(&service, "alice").await?, coins(100));
    Ok(())
}

#[tokio::test]
async fn test_repeated_purchases_until_broke() -> Result<()> {
    let (service, _temp) = sqlite_service().await?;
    Shop::create_catalog(&service).await?;
    Shop::open_accounts(&service, &[("alice", 50)]).await?;

    service.buy("alice", "cup").await?;
    service.buy("alice", "cup").await?;
    service.buy("alice", "pen").await?;
    assert_eq!(Shop::balance(&service, "alice").await?, 0);

    let err = service.buy("alice", "pen").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(service.purchases("alice").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_price_change_does_not_rewrite_history() -> Result<()> {
    let service = memory_service();
    Shop::create_catalog(&service).await?;
    Shop::open_accounts(&service, &[("alice", 100)]).await?;

    service.buy("alice", "cup").await?;
    service.add_item("cup", coins(25)).await?;
    service.buy("alice", "cup").await?;

    let prices: Vec<_> = service
        .purchases("alice")
        .await?
        .iter()
        .map(|p| p.price)
        .collect();
    assert_eq!(prices, vec![coins(20), coins(25)]);
    assert_eq!(Shop::balance(&service, "alice").await?, coins(55));
    Ok(())
}

#[tokio::test]
async fn test_storage_failures_roll_back_purchase() -> Result<()> {
    for point in [FailPoint::SaveAccount, FailPoint::AppendPurchase, FailPoint::Commit] {
        let service = memory_service();
        Shop::create_catalog(&service).await?;
        Shop::open_accounts(&service, &[("alice", 100)]).await?;
        service.engine().store().fail_on(point).await;

        let err = service.buy("alice", "cup").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StorageFailure, "at {:?}", point);
        assert!(err.is_retryable());
        assert_eq!(Shop::balance(&service, "alice").await?, coins(100));
        assert!(service.purchases("alice").await?.is_empty());

        // the same call goes through once storage recovers
        service.engine().store().clear_failures().await;
        service.buy("alice", "cup").await?;
        assert_eq!(Shop::balance(&service, "alice").await?, coins(80));
    }
    Ok(())
}
