use std::io::{self, Write};

use cbz_store_core::entry::zip::{compress_check, MIN_COMPRESS};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

struct CounterWrite(usize);
impl io::Write for CounterWrite {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len();
        self.0 += n;
        Ok(n)
    }
    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn compressed_len_d(b: &[u8]) -> usize {
    use flate2::{Compression, write::DeflateEncoder};
    let mut enc = DeflateEncoder::new(CounterWrite(0), Compression::best());
    enc.write_all(b).unwrap();
    enc.finish().unwrap().0
}

fn noise(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x2545_f491;
    (0..len).map(|_| {
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        x as u8
    }).collect()
}

fn index_like(chapters: usize) -> Vec<u8> {
    let mut s = String::from(r#"{"id":42,"title":"Sample","url":"/manga/42","source":"TEST","chapters":{"#);
    for i in 1..=chapters {
        if i > 1 {
            s.push(',');
        }
        s.push_str(&format!(
            r#""{i}":{{"number":{i}.0,"volume":0,"url":"/ch/{i}","name":"Chapter {i}","uploadDate":0,"entries":"00000000_{i:03}\\d{{3}}"}}"#
        ));
    }
    s.push_str(r#"},"cover_entry":"00000000_000000.jpg"}"#);
    s.into_bytes()
}

pub fn bench_group_compress(c: &mut Criterion, name: &str, data: &[u8]) {
    let mut g = c.benchmark_group(format!("compress {name}"));
    g.throughput(Throughput::Bytes(data.len() as u64));
    g.bench_function("check", |b| b.iter(|| compress_check(data, MIN_COMPRESS)));
    g.bench_function("deflate", |b| b.iter(|| compressed_len_d(data)));
    g.finish();
}

pub fn bench_compress_rate(c: &mut Criterion) {
    bench_group_compress(c, "page", &noise(256 * 1024));
    bench_group_compress(c, "index", &index_like(300));
}

criterion_group!(ben, bench_compress_rate);
criterion_main!(ben);
