/*!
This crate converts a trained random forest into a probabilistic circuit. Every leaf of every tree becomes a mixture component, weighted by the fraction of rows that land in it, and within each leaf every variable is given its own distribution: a truncated normal or uniform for continuous variables and a multinomial for categorical ones.

```no_run
use arf_core::{estimate, EstimateOptions};
# fn run(forest: &arf_tree::Forest, features: &arf_dataframe::DataFrame) -> arf_core::Result<()> {
let circuit = estimate(forest, features, &EstimateOptions::default())?;
for leaf in circuit.leaves.iter() {
	println!("{} {} {}", leaf.tree, leaf.leaf, leaf.coverage);
}
# Ok(())
# }
```
*/

#![allow(clippy::tabs_in_doc_comments)]

mod categorical;
mod continuous;
mod coverage;
mod index;

pub mod circuit;
pub mod config;
pub mod error;
pub mod estimate;

pub use self::{
	circuit::{
		CategoricalParams, Circuit, ContinuousDistribution, ContinuousParams, Family, Leaf,
		VariableClass, VariableMetadata,
	},
	config::{
		load_config, Config, ContinuousFamily, EstimateOptions, FiniteBounds, SamplingPolicy,
	},
	error::{Error, Result},
	estimate::estimate,
};
