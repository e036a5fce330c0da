use criterion::{criterion_group, criterion_main, Criterion};
use capset_core::{CapSet, Iab, ValueSpace};

fn text_benchmarks(c: &mut Criterion) {
    let space = ValueSpace::new(41);
    let text = "=ep cap_setuid,cap_setgid-e cap_setfcap+i cap_net_raw,cap_sys_admin-eip";
    let set = CapSet::from_text_in(space, text).unwrap();

    c.bench_function("capset_from_text", |b| {
        b.iter(|| {
            let _set = CapSet::from_text_in(space, text).unwrap();
        })
    });

    c.bench_function("capset_to_string", |b| {
        b.iter(|| {
            let _text = set.to_string();
        })
    });

    c.bench_function("capset_export_import", |b| {
        b.iter(|| {
            let ex = set.export();
            let _set = CapSet::import_in(space, &ex).unwrap();
        })
    });

    let iab_text = "!cap_chown,cap_setuid,^cap_net_raw,^%cap_setfcap";
    c.bench_function("iab_from_text", |b| {
        b.iter(|| {
            let _iab = Iab::from_text_in(space, iab_text).unwrap();
        })
    });
}

criterion_group!(benches, text_benchmarks);
criterion_main!(benches);
