use std::io::Stdout;

use pbr::{ProgressBar, Units};

pub struct ProgressBarReporter {
    pb: ProgressBar<Stdout>,
}

impl ProgressBarReporter {
    pub fn new(total_bytes: usize) -> Self {
        let mut pb = ProgressBar::new(total_bytes as u64);
        pb.set_units(Units::Bytes);
        Self { pb }
    }

    pub fn advance(&mut self, bytes: usize) {
        self.pb.add(bytes as u64);
    }

    pub fn finish(&mut self) {
        self.pb.finish();
        // New line after progress bar
        println!();
    }
}
