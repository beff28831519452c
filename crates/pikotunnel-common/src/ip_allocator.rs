// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Address selection inside the relay subnet.
//!
//! Candidates are drawn uniformly from the host range, skipping the network
//! address, the broadcast address and the relay's own address. Random draws
//! are capped; after the cap a linear sweep guarantees that a free address is
//! found whenever one exists, so the only failure is a genuinely full subnet.

use ipnet::Ipv4Net;
use rand::Rng;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Default number of random draws before falling back to a sweep.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
	#[error("invalid subnet {subnet}: {reason}")]
	InvalidSubnet { subnet: String, reason: String },

	#[error("no free address left in {subnet}")]
	SubnetExhausted { subnet: Ipv4Net },
}

#[derive(Debug, Clone)]
pub struct IpAllocator {
	subnet: Ipv4Net,
	relay: Ipv4Addr,
	max_attempts: u32,
}

impl IpAllocator {
	/// Build an allocator from the relay CIDR, e.g. `10.8.0.1/24`.
	///
	/// The host part is the relay address; the network part is the subnet
	/// peers are drawn from.
	pub fn from_relay_cidr(relay_cidr: Ipv4Net, max_attempts: u32) -> Result<Self, AllocationError> {
		Self::new(relay_cidr.trunc(), relay_cidr.addr(), max_attempts)
	}

	pub fn new(subnet: Ipv4Net, relay: Ipv4Addr, max_attempts: u32) -> Result<Self, AllocationError> {
		let subnet = subnet.trunc();
		let invalid = |reason: &str| AllocationError::InvalidSubnet {
			subnet: subnet.to_string(),
			reason: reason.to_string(),
		};

		if subnet.prefix_len() > 30 {
			return Err(invalid("prefix must leave room for at least two hosts"));
		}
		if !subnet.contains(&relay) {
			return Err(invalid("relay address is outside the subnet"));
		}
		if relay == subnet.network() || relay == subnet.broadcast() {
			return Err(invalid("relay address must be a host address"));
		}

		Ok(Self {
			subnet,
			relay,
			max_attempts: max_attempts.max(1),
		})
	}

	pub fn subnet(&self) -> Ipv4Net {
		self.subnet
	}

	pub fn relay(&self) -> Ipv4Addr {
		self.relay
	}

	/// Number of assignable host addresses, relay included.
	fn host_count(&self) -> u32 {
		let host_bits = 32 - u32::from(self.subnet.prefix_len());
		((1u64 << host_bits) - 2) as u32
	}

	fn candidate(&self, offset: u32) -> Ipv4Addr {
		Ipv4Addr::from(u32::from(self.subnet.network()) + offset)
	}

	fn is_free(&self, addr: Ipv4Addr, used: &HashSet<Ipv4Addr>) -> bool {
		addr != self.relay && !used.contains(&addr)
	}

	/// Pick an address not present in `used`.
	pub fn allocate<R: Rng + ?Sized>(
		&self,
		used: &HashSet<Ipv4Addr>,
		rng: &mut R,
	) -> Result<Ipv4Addr, AllocationError> {
		let hosts = self.host_count();

		for _ in 0..self.max_attempts {
			let candidate = self.candidate(rng.gen_range(1..=hosts));
			if self.is_free(candidate, used) {
				return Ok(candidate);
			}
		}

		tracing::debug!(
			subnet = %self.subnet,
			attempts = self.max_attempts,
			used = used.len(),
			"random allocation missed, sweeping host range"
		);

		(1..=hosts)
			.map(|offset| self.candidate(offset))
			.find(|addr| self.is_free(*addr, used))
			.ok_or(AllocationError::SubnetExhausted {
				subnet: self.subnet,
			})
	}

	pub fn allocate_random(&self, used: &HashSet<Ipv4Addr>) -> Result<Ipv4Addr, AllocationError> {
		self.allocate(used, &mut rand::thread_rng())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rand::rngs::StdRng;
	use rand::SeedableRng;

	fn allocator(cidr: &str) -> IpAllocator {
		IpAllocator::from_relay_cidr(cidr.parse().unwrap(), DEFAULT_MAX_ATTEMPTS).unwrap()
	}

	#[test]
	fn relay_cidr_splits_into_subnet_and_relay() {
		let alloc = allocator("10.8.0.1/24");
		assert_eq!(alloc.subnet().to_string(), "10.8.0.0/24");
		assert_eq!(alloc.relay(), Ipv4Addr::new(10, 8, 0, 1));
	}

	#[test]
	fn rejects_tiny_prefix() {
		let err = IpAllocator::from_relay_cidr("10.0.0.1/31".parse().unwrap(), 8).unwrap_err();
		assert!(matches!(err, AllocationError::InvalidSubnet { .. }));
	}

	#[test]
	fn rejects_relay_on_network_address() {
		let err = IpAllocator::from_relay_cidr("10.8.0.0/24".parse().unwrap(), 8).unwrap_err();
		assert!(matches!(err, AllocationError::InvalidSubnet { .. }));
	}

	#[test]
	fn slash_30_has_one_slot_besides_relay() {
		let alloc = allocator("192.168.5.1/30");
		let mut rng = StdRng::seed_from_u64(7);
		let ip = alloc.allocate(&HashSet::new(), &mut rng).unwrap();
		assert_eq!(ip, Ipv4Addr::new(192, 168, 5, 2));

		let used = HashSet::from([ip]);
		let err = alloc.allocate(&used, &mut rng).unwrap_err();
		assert_eq!(
			err,
			AllocationError::SubnetExhausted {
				subnet: "192.168.5.0/30".parse().unwrap()
			}
		);
	}

	#[test]
	fn sweep_finds_last_free_address() {
		let alloc = IpAllocator::from_relay_cidr("10.8.0.1/24".parse().unwrap(), 1).unwrap();
		let used: HashSet<Ipv4Addr> = (2..=254)
			.filter(|o| *o != 77)
			.map(|o| Ipv4Addr::new(10, 8, 0, o))
			.collect();
		let mut rng = StdRng::seed_from_u64(1);
		assert_eq!(alloc.allocate(&used, &mut rng).unwrap(), Ipv4Addr::new(10, 8, 0, 77));
	}

	proptest! {
		#[test]
		fn allocated_address_is_a_free_host(
			seed in any::<u64>(),
			prefix in 24u8..=30,
			used_offsets in proptest::collection::hash_set(1u32..64, 0..40),
		) {
			let subnet = Ipv4Net::new(Ipv4Addr::new(10, 8, 0, 0), prefix).unwrap();
			let alloc = IpAllocator::new(subnet, Ipv4Addr::new(10, 8, 0, 1), 16).unwrap();
			let used: HashSet<Ipv4Addr> = used_offsets
				.into_iter()
				.map(|o| Ipv4Addr::from(u32::from(subnet.network()) + o))
				.collect();

			let mut rng = StdRng::seed_from_u64(seed);
			match alloc.allocate(&used, &mut rng) {
				Ok(ip) => {
					prop_assert!(subnet.contains(&ip));
					prop_assert_ne!(ip, subnet.network());
					prop_assert_ne!(ip, subnet.broadcast());
					prop_assert_ne!(ip, alloc.relay());
					prop_assert!(!used.contains(&ip));
				}
				Err(AllocationError::SubnetExhausted { .. }) => {
					let free = subnet
						.hosts()
						.filter(|h| *h != alloc.relay() && !used.contains(h))
						.count();
					prop_assert_eq!(free, 0);
				}
				Err(other) => prop_assert!(false, "unexpected error: {other}"),
			}
		}
	}
}
