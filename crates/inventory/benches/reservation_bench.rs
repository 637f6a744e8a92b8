use common::Money;
use criterion::{Criterion, criterion_group, criterion_main};
use inventory::{InMemoryInventoryStore, InventoryStore, Product};

fn bench_decrease_single(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let product = Product::new("Bench", Money::from_cents(100), u32::MAX);
    let id = product.id;
    let store = rt.block_on(InMemoryInventoryStore::with_products([product]));

    c.bench_function("inventory/decrease_stock", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.decrease_stock(id, 1).await.unwrap();
            });
        });
    });
}

fn bench_reserve_and_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let product = Product::new("Bench", Money::from_cents(100), 1_000);
    let id = product.id;
    let store = rt.block_on(InMemoryInventoryStore::with_products([product]));

    c.bench_function("inventory/reserve_and_release", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.decrease_stock(id, 5).await.unwrap();
                store.increase_stock(id, 5).await.unwrap();
            });
        });
    });
}

fn bench_contended_decrements(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .build()
        .unwrap();

    c.bench_function("inventory/contended_decrements_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let product = Product::new("Bench", Money::from_cents(100), 50);
                let id = product.id;
                let store = InMemoryInventoryStore::with_products([product]).await;

                let handles: Vec<_> = (0..100)
                    .map(|_| {
                        let store = store.clone();
                        tokio::spawn(async move { store.decrease_stock(id, 1).await })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.await.unwrap();
                }
            });
        });
    });
}

fn bench_check_stock(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let products: Vec<Product> = (0..1_000)
        .map(|i| Product::new(format!("Product {i}"), Money::from_cents(100), 10))
        .collect();
    let id = products[500].id;
    let store = rt.block_on(InMemoryInventoryStore::with_products(products));

    c.bench_function("inventory/check_stock_1000_rows", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.check_stock(id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_decrease_single,
    bench_reserve_and_release,
    bench_contended_decrements,
    bench_check_stock,
);
criterion_main!(benches);
