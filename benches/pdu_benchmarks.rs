// ABOUTME: Benchmark suite for the SMS PDU codec and the serial line framer
// ABOUTME: Measures PDU encoding and decoding, septet packing and line splitting

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use gsm_modem::codec::{SmsPdu, SubmitOptions, encode_sms_submit_pdu};
use gsm_modem::datatypes::gsm7::{decode_gsm7, encode_gsm7};
use gsm_modem::datatypes::septets::{pack_septets, unpack_septets};
use gsm_modem::frame::LineFramer;
use std::time::Duration;

const DELIVER_PDU: &str = "06917228195339040B917228214365F700003130805120618005D4F29C2E03";
const STATUS_REPORT_PDU: &str = "07917248014000F506B70AA18092020000317071518590803170715185418000";
const CONCATENATED_PDU: &str = "0591721891F1400781721881F800003160526104848059050003C30101916536FB1DCABEEB2074D85E064941B19CAB060319A5C522289C96D3D3ED32286C0FA7D96131BBEC024941B19CAB0603DDD36C36A88C87A7E565D0DB0D82C55EB0DB4B068BCD5C20";

fn bench_encode_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_submit");
    group.measurement_time(Duration::from_secs(10));
    let options = SubmitOptions::default().with_reference(1);

    group.bench_function("gsm7_short", |b| {
        b.iter(|| encode_sms_submit_pdu(black_box("+27820001111"), black_box("Hello World"), &options).unwrap())
    });

    group.bench_function("ucs2_short", |b| {
        b.iter(|| encode_sms_submit_pdu(black_box("+27820001111"), black_box("Привет, мир"), &options).unwrap())
    });

    let long_text = "Lorem ipsum dolor sit amet ".repeat(20);
    group.bench_function("gsm7_concatenated", |b| {
        b.iter(|| encode_sms_submit_pdu(black_box("+27820001111"), black_box(&long_text), &options).unwrap())
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.measurement_time(Duration::from_secs(10));

    for (name, pdu) in [
        ("deliver", DELIVER_PDU),
        ("status_report", STATUS_REPORT_PDU),
        ("concatenated_deliver", CONCATENATED_PDU),
    ] {
        group.bench_function(name, |b| b.iter(|| black_box(pdu).parse::<SmsPdu>().unwrap()));
    }

    group.finish();
}

fn bench_septets(c: &mut Criterion) {
    let mut group = c.benchmark_group("septets");
    group.measurement_time(Duration::from_secs(10));

    for size in [10, 70, 160] {
        let text = "A{".repeat(size / 2);
        let septets = encode_gsm7(&text, false).unwrap();
        let packed = pack_septets(&septets, 0);

        group.bench_with_input(BenchmarkId::new("pack", size), &septets, |b, septets| {
            b.iter(|| pack_septets(black_box(septets), 0))
        });
        group.bench_with_input(BenchmarkId::new("unpack_decode", size), &packed, |b, packed| {
            b.iter(|| decode_gsm7(&unpack_septets(black_box(packed), Some(septets.len()), 0)))
        });
    }

    group.finish();
}

fn bench_line_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_framer");
    group.measurement_time(Duration::from_secs(10));

    let response = format!("\r\n+CMGR: 0,,24\r\n{DELIVER_PDU}\r\n\r\nOK\r\n").repeat(16);
    group.bench_function("cmgr_responses", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new();
            framer.feed(black_box(response.as_bytes()))
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_submit,
    bench_decode,
    bench_septets,
    bench_line_framer
);
criterion_main!(benches);
