//! Integration flows across the collator, the keypers and the transports.

#[cfg(test)]
mod fixtures;

#[cfg(test)]
mod encrypted_mempool;
#[cfg(test)]
mod keyper_committee;
#[cfg(test)]
mod standalone_nodes;
