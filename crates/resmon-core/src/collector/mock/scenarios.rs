//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` contents for the files the
//! collectors read, plus helpers to regenerate a file with a different
//! device set.

use super::filesystem::MockFs;

impl MockFs {
    /// Creates a typical four-core machine with two disks and two interfaces.
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file("/proc/sys/kernel/hostname", "testhost\n");
        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapCached:            0 kB
Active:          4096000 kB
Inactive:        2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
Writeback:             0 kB
Slab:             512000 kB
SReclaimable:     256000 kB
",
        );
        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file("/proc/diskstats", Self::diskstats(&[("sda", 1000), ("sdb", 2000)]));
        fs.add_file("/proc/net/dev", Self::net_dev(&[("lo", 100), ("eth0", 5000)]));

        fs
    }

    /// Builds `/proc/diskstats` content with one line per `(name, base)`.
    ///
    /// Counters are derived from `base` so that distinct bases give distinct
    /// readings: reads = base, read sectors = 8 × base, read ms = base / 2,
    /// writes = base / 4, write sectors = 2 × base, write ms = base / 8,
    /// io ms = base / 10.
    pub fn diskstats(disks: &[(&str, u64)]) -> String {
        disks
            .iter()
            .enumerate()
            .map(|(i, (name, base))| {
                format!(
                    "   8       {minor} {name} {r} 10 {rs} {rt} {w} 5 {ws} {wt} 0 {io} {wio} 0 0 0 0\n",
                    minor = i * 16,
                    r = base,
                    rs = base * 8,
                    rt = base / 2,
                    w = base / 4,
                    ws = base * 2,
                    wt = base / 8,
                    io = base / 10,
                    wio = base / 5,
                )
            })
            .collect()
    }

    /// Builds `/proc/net/dev` content with one line per `(name, base)`.
    ///
    /// rx bytes = base, rx packets = base / 10, tx bytes = 2 × base,
    /// tx packets = base / 5.
    pub fn net_dev(interfaces: &[(&str, u64)]) -> String {
        let mut content = String::from(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
        );
        for (name, base) in interfaces {
            content.push_str(&format!(
                "{name:>6}: {rb} {rp} 0 0 0 0 0 0 {tb} {tp} 0 0 0 0 0 0\n",
                rb = base,
                rp = base / 10,
                tb = base * 2,
                tp = base / 5,
            ));
        }
        content
    }

    /// Builds `/proc/stat` content for `cores` identical cores.
    pub fn proc_stat(cores: usize, user: u64) -> String {
        let mut content = format!(
            "cpu  {} 0 {} {} 0 0 0 0 0 0\n",
            user * cores as u64,
            user / 2 * cores as u64,
            user * 10 * cores as u64
        );
        for core in 0..cores {
            content.push_str(&format!(
                "cpu{core} {user} 1 {sys} {idle} 2 3 4 0 0 0\n",
                sys = user / 2,
                idle = user * 10,
            ));
        }
        content.push_str("intr 1000 0 0\nctxt 5000\nbtime 1700000000\n");
        content
    }
}
