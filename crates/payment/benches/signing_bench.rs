use std::collections::BTreeMap;

use criterion::{Criterion, criterion_group, criterion_main};
use payment::Signer;

fn callback_params() -> BTreeMap<String, String> {
    [
        ("vnp_Amount", "250000"),
        ("vnp_BankCode", "NCB"),
        ("vnp_BankTranNo", "VNP14226112"),
        ("vnp_CardType", "ATM"),
        ("vnp_OrderInfo", "Thanh toan don hang:1042"),
        ("vnp_PayDate", "20260302033000"),
        ("vnp_ResponseCode", "00"),
        ("vnp_TmnCode", "TMN01"),
        ("vnp_TransactionNo", "14226112"),
        ("vnp_TransactionStatus", "00"),
        ("vnp_TxnRef", "48213377"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn bench_sign(c: &mut Criterion) {
    let signer = Signer::new("bench-secret").unwrap();
    let params = callback_params();

    c.bench_function("payment/sign_callback", |b| b.iter(|| signer.sign(&params)));
}

fn bench_verify(c: &mut Criterion) {
    let signer = Signer::new("bench-secret").unwrap();
    let params = callback_params();
    let hash = signer.sign(&params);

    c.bench_function("payment/verify_callback", |b| {
        b.iter(|| signer.verify(&params, &hash))
    });
}

criterion_group!(benches, bench_sign, bench_verify);
criterion_main!(benches);
