use flowpin_core::topology::ClockSource;
use flowpin_core::{Result, SysTopology, Topology};

/// Print the detected logical cores, their NUMA nodes, and optionally each
/// core's live scaling frequency.
pub fn run(frequencies: bool) -> Result<()> {
    let clock = if frequencies {
        ClockSource::Dynamic
    } else {
        ClockSource::Static(0.0)
    };
    let topology = SysTopology::detect(clock)?;

    println!(
        "{} logical core(s) across {} NUMA node(s)\n",
        topology.core_count(),
        topology.numa_count()
    );

    for core_id in 0..topology.core_count() {
        let numa_id = topology.core_to_numa(core_id)?;
        if frequencies {
            let hz = topology.clock_frequency_hz(core_id)?;
            println!("  core {core_id:>3}  numa {numa_id}  {:>8.1} MHz", hz / 1e6);
        } else {
            println!("  core {core_id:>3}  numa {numa_id}");
        }
    }

    Ok(())
}
