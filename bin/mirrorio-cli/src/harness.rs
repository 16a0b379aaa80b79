//! Harness scenarios
//!
//! Drives a mirror set through the read/write checks the block device has
//! to pass. Each scenario prints a banner and a `[SUCCESS]` / `[FAILED]`
//! line.

use bytes::Bytes;
use mirrorio_common::MemberId;
use mirrorio_mirror::MirrorSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub struct Harness<'a> {
    set: &'a MirrorSet,
    block_size: usize,
    rng: StdRng,
}

impl<'a> Harness<'a> {
    pub fn new(set: &'a MirrorSet, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            set,
            block_size: set.block_size() as usize,
            rng,
        }
    }

    /// Run every scenario; returns the number that failed
    ///
    /// An engine error fails only the scenario that hit it.
    pub async fn run_all(&mut self, times: usize) -> usize {
        println!("total size: {}", self.set.capacity());
        let results = [
            settle("block random read/write", self.random_readwrite(times).await),
            settle("block first write to member0", self.first_write_to_member0().await),
            settle("block first write to member1", self.first_write_to_member1().await),
            settle("block write with members", self.interleaved_pattern(times).await),
            settle("mirror consistency", self.final_verify().await),
        ];
        results.iter().filter(|passed| !**passed).count()
    }

    /// Random payloads at random offsets read back through the device
    pub async fn random_readwrite(&mut self, times: usize) -> anyhow::Result<bool> {
        println!("----------testing block random read/write----------");
        let capacity = self.set.capacity();

        for _ in 0..times {
            let size = self.rng.gen_range(1..=capacity);
            let offset = self.rng.gen_range(0..=capacity - size);
            let mut data = vec![0u8; size as usize];
            self.rng.fill(data.as_mut_slice());
            debug!("random write offset={} size={}", offset, size);

            self.set.write(offset, data.clone()).await?;
            self.set.flush().await?;
            let read = self.set.read(offset, data.len()).await?;

            if let Some(pos) = first_difference(&data, &read) {
                println!("data mismatch at offset: {offset}");
                println!("mismatch at byte: {pos}");
                println!("data: {}", data[pos]);
                println!("read_data: {}", read[pos]);
                println!();
                println!("[FAILED]test block random read/write failed");
                return Ok(false);
            }
        }
        println!("[SUCCESS]test block random read/write passed");
        Ok(true)
    }

    /// A zero block at offset 0 lands on member0
    pub async fn first_write_to_member0(&mut self) -> anyhow::Result<bool> {
        println!("----------testing block first write to member0----------");
        let expected = Bytes::from(vec![0u8; self.block_size]);
        self.check_member_write(MemberId::new(0), 0, expected, "member0")
            .await
    }

    /// A 0xFF block at offset `block_size` lands on member1 at the same
    /// offset
    pub async fn first_write_to_member1(&mut self) -> anyhow::Result<bool> {
        println!("----------testing block first write to member1----------");
        let expected = Bytes::from(vec![0xFFu8; self.block_size]);
        self.check_member_write(
            MemberId::new(1),
            self.block_size as u64,
            expected,
            "member1",
        )
        .await
    }

    async fn check_member_write(
        &self,
        member: MemberId,
        offset: u64,
        data: Bytes,
        name: &str,
    ) -> anyhow::Result<bool> {
        if self.set.member_count() <= member.index() {
            println!("[FAILED]test block first write to {name} failed: no such member");
            return Ok(false);
        }
        self.set.write(offset, data.clone()).await?;
        self.set.flush().await?;

        if self.set.read(offset, data.len()).await? != data {
            println!("[FAILED]test block first write to {name} failed: read write mismatch");
            return Ok(false);
        }
        let on_member = self.set.member_read(member, offset, data.len()).await?;
        if on_member != data {
            println!("read{name}: {}", hex::encode(&on_member));
            println!("[FAILED]test block first write to {name} failed");
            return Ok(false);
        }
        println!("[SUCCESS]test block first write to {name} passed");
        Ok(true)
    }

    /// Alternating zero / 0xFF blocks; every member must hold the pattern
    pub async fn interleaved_pattern(&mut self, times: usize) -> anyhow::Result<bool> {
        println!("----------testing block write with members----------");
        let bs = self.block_size;
        let span = (2 * bs * times) as u64;
        if span > self.set.capacity() {
            println!("[FAILED]test block write with members failed: not enough space");
            return Ok(false);
        }

        let mut pair = vec![0u8; bs];
        pair.extend(std::iter::repeat_n(0xFFu8, bs));
        let pair = Bytes::from(pair);
        for i in 0..times {
            self.set.write((i * 2 * bs) as u64, pair.clone()).await?;
        }
        self.set.flush().await?;

        for idx in 0..self.set.member_count() {
            let member = MemberId::new(idx);
            let image = self.set.member_read(member, 0, span as usize).await?;
            for (block, chunk) in image.chunks(bs).enumerate() {
                let expected = if block % 2 == 0 { 0x00 } else { 0xFF };
                if chunk.iter().any(|&b| b != expected) {
                    println!("{member} block {block}: {}", hex::encode(chunk));
                    println!("[FAILED]test block write with members failed");
                    return Ok(false);
                }
            }
        }
        println!("[SUCCESS]test block write with members passed");
        Ok(true)
    }

    /// Members are identical over the whole device
    pub async fn final_verify(&mut self) -> anyhow::Result<bool> {
        println!("----------testing mirror consistency----------");
        match self.set.verify(0, self.set.capacity()).await? {
            None => {
                println!("[SUCCESS]test mirror consistency passed");
                Ok(true)
            }
            Some(report) => {
                println!("divergence at offset: {}", report.first.offset);
                for byte in &report.first.bytes {
                    println!("{}: {}", byte.member, byte.value);
                }
                println!("[FAILED]test mirror consistency failed");
                Ok(false)
            }
        }
    }
}

fn settle(name: &str, result: anyhow::Result<bool>) -> bool {
    result.unwrap_or_else(|e| {
        println!("[FAILED]test {name} failed: {e}");
        false
    })
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}
