// Copyright 2020 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::common::{Ident, Result};
use crate::sim::{Specs, TIME_OFF};

/// Results is a snapshot of every saved row of a simulation.
#[derive(Clone, PartialEq, Debug)]
pub struct Results {
    pub offsets: HashMap<Ident, usize>,
    // one large allocation
    pub data: Box<[f64]>,
    pub step_size: usize,
    pub step_count: usize,
    pub specs: Specs,
}

impl Results {
    pub fn iter(&self) -> std::iter::Take<std::slice::Chunks<'_, f64>> {
        self.data.chunks(self.step_size).take(self.step_count)
    }

    // time first, then everything else by name
    fn columns(&self) -> Vec<(&str, usize)> {
        let mut columns: Vec<(&str, usize)> = self
            .offsets
            .iter()
            .filter(|(_, off)| **off != TIME_OFF)
            .map(|(name, off)| (name.as_str(), *off))
            .collect();
        columns.sort_unstable();
        columns.insert(0, ("time", TIME_OFF));
        columns
    }

    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        let off = *self.offsets.get(name)?;
        Some(self.iter().map(|row| row[off]).collect())
    }

    pub fn write_tsv<W: Write>(&self, mut w: W) -> io::Result<()> {
        let columns = self.columns();
        let header: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        writeln!(w, "{}", header.join("\t"))?;

        for curr in self.iter() {
            if curr[TIME_OFF] > self.specs.stop {
                break;
            }
            let row: Vec<String> = columns
                .iter()
                .map(|(_, off)| format!("{}", curr[*off]))
                .collect();
            writeln!(w, "{}", row.join("\t"))?;
        }
        Ok(())
    }

    pub fn print_tsv(&self) {
        let stdout = io::stdout();
        if let Err(err) = self.write_tsv(stdout.lock()) {
            log::warn!("print_tsv: {}", err);
        }
    }

    pub fn write_csv<W: Write>(&self, w: W) -> Result<()> {
        let columns = self.columns();
        let mut wtr = csv::Writer::from_writer(w);
        wtr.write_record(columns.iter().map(|(name, _)| *name))?;

        for curr in self.iter() {
            if curr[TIME_OFF] > self.specs.stop {
                break;
            }
            wtr.write_record(columns.iter().map(|(_, off)| format!("{}", curr[*off])))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::Method;

    fn results() -> Results {
        let mut offsets = HashMap::new();
        offsets.insert("time".to_owned(), 0);
        offsets.insert("stock".to_owned(), 2);
        offsets.insert("flow".to_owned(), 1);
        Results {
            offsets,
            data: vec![0.0, 1.0, 10.0, 1.0, 1.0, 11.0, 2.0, 1.0, 12.0].into_boxed_slice(),
            step_size: 3,
            step_count: 3,
            specs: Specs {
                start: 0.0,
                stop: 1.0,
                dt: 1.0,
                save_step: 1.0,
                method: Method::Euler,
            },
        }
    }

    #[test]
    fn test_series() {
        let results = results();
        assert_eq!(Some(vec![10.0, 11.0, 12.0]), results.series("stock"));
        assert_eq!(None, results.series("nope"));
        assert_eq!(3, results.iter().count());
    }

    #[test]
    fn test_write_tsv() {
        let mut out: Vec<u8> = vec![];
        results().write_tsv(&mut out).unwrap();
        // rows past the stop time aren't written
        assert_eq!(
            "time\tflow\tstock\n0\t1\t10\n1\t1\t11\n",
            String::from_utf8(out).unwrap()
        );
    }

    #[test]
    fn test_write_csv() {
        let mut out: Vec<u8> = vec![];
        results().write_csv(&mut out).unwrap();
        assert_eq!(
            "time,flow,stock\n0,1,10\n1,1,11\n",
            String::from_utf8(out).unwrap()
        );
    }
}
