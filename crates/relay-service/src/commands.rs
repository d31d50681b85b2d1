//! Operator subcommands.
//!
//! Each command resolves a request against a configured forwarder and renders
//! its result as one line of text, or JSON with `--json`. `execute` runs with
//! the configured account as operator.

use crate::factory_registry::Relayer;
use alloy_primitives::{Address, Bytes, U256};
use clap::{Args, Subcommand};
use relay_forwarder::ForwarderKind;
use relay_types::{ExecutionContext, ForwardRequest, RelayRequest, Signature, SimpleCallRequest};
use serde::Serialize;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
	/// Print the digest a signer must sign for a request
	Hash(RequestArgs),
	/// Sign a request with the configured account
	Sign(RequestArgs),
	/// Check a signature (and, for robust, the nonce) without executing
	Verify {
		#[command(flatten)]
		request: RequestArgs,
		/// Packed 65-byte signature as hex
		#[arg(long)]
		signature: Signature,
	},
	/// Verify and execute a signed request
	Execute {
		#[command(flatten)]
		request: RequestArgs,
		/// Packed 65-byte signature as hex
		#[arg(long)]
		signature: Signature,
		/// Gas budget of the whole execution
		#[arg(long, default_value = "1000000")]
		gas_limit: u64,
		/// Native value the operator attaches to the execution
		#[arg(long = "msg-value", default_value = "0")]
		msg_value: U256,
	},
	/// Print the current nonce of a signer
	Nonce {
		#[arg(long)]
		forwarder: Option<ForwarderKind>,
		#[arg(long)]
		signer: Address,
	},
	/// Print the address of the configured account
	Address,
}

/// Request fields. `value`, `gas` and `nonce` only apply to the robust forwarder.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
	/// Forwarder variant; defaults to the configured primary
	#[arg(long)]
	pub forwarder: Option<ForwarderKind>,
	/// Signer the call is attributed to; defaults to the configured account
	#[arg(long)]
	pub from: Option<Address>,
	/// Call target
	#[arg(long)]
	pub to: Address,
	/// Calldata for the target as hex
	#[arg(long, default_value = "0x", value_parser = parse_calldata)]
	pub data: Bytes,
	#[arg(long, default_value = "0")]
	pub value: U256,
	#[arg(long, default_value = "100000")]
	pub gas: U256,
	/// Defaults to the signer's current nonce
	#[arg(long)]
	pub nonce: Option<U256>,
}

/// Hex calldata, with or without `0x`.
fn parse_calldata(s: &str) -> Result<Bytes, String> {
	s.parse::<Bytes>()
		.map_err(|e| format!("invalid hex calldata '{}': {}", s, e))
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "lowercase")]
enum Output {
	Hash {
		forwarder: &'static str,
		digest: String,
	},
	Sign {
		forwarder: &'static str,
		digest: String,
		signature: String,
	},
	Verify {
		forwarder: &'static str,
		valid: bool,
	},
	Execute {
		forwarder: &'static str,
		success: bool,
		gas_used: u64,
		return_data: Bytes,
	},
	Nonce {
		forwarder: &'static str,
		signer: Address,
		nonce: Option<U256>,
	},
	Address {
		address: Address,
	},
}

impl Output {
	fn line(&self) -> String {
		match self {
			Output::Hash { digest, .. } => digest.clone(),
			Output::Sign { signature, .. } => signature.clone(),
			Output::Verify { valid, .. } => valid.to_string(),
			Output::Execute {
				success,
				gas_used,
				return_data,
				..
			} => format!("success={} gas_used={} return_data={}", success, gas_used, return_data),
			Output::Nonce { nonce: Some(nonce), .. } => nonce.to_string(),
			Output::Nonce { forwarder, .. } => format!("{} forwarder has no nonces", forwarder),
			Output::Address { address } => format!("{:#x}", address),
		}
	}
}

impl Relayer {
	async fn signer(&self, from: Option<Address>) -> Result<Address, Box<dyn std::error::Error>> {
		match (from, &self.account) {
			(Some(from), _) => Ok(from),
			(None, Some(account)) => Ok(account.get_address().await?),
			(None, None) => Err("--from is required when no account is configured".into()),
		}
	}

	/// Builds the request shape the selected forwarder accepts.
	async fn request(
		&self,
		args: &RequestArgs,
	) -> Result<(ForwarderKind, RelayRequest), Box<dyn std::error::Error>> {
		let forwarder = self.forwarders.forwarder(args.forwarder)?;
		let kind = forwarder.kind();
		let from = self.signer(args.from).await?;

		let request = match kind {
			ForwarderKind::Robust => {
				let nonce = match args.nonce {
					Some(nonce) => nonce,
					None => forwarder.nonce_of(from).await?.unwrap_or_default(),
				};
				RelayRequest::Forward(ForwardRequest {
					from,
					to: args.to,
					value: args.value,
					gas: args.gas,
					nonce,
					data: args.data.clone(),
				})
			},
			ForwarderKind::Simple | ForwarderKind::Optimized => {
				tracing::debug!(kind = %kind, "Ignoring value, gas and nonce for call request");
				RelayRequest::Call(SimpleCallRequest::new(from, args.to, args.data.clone()))
			},
		};
		Ok((kind, request))
	}

	async fn output(&self, command: &Command) -> Result<Output, Box<dyn std::error::Error>> {
		match command {
			Command::Hash(args) => {
				let (kind, request) = self.request(args).await?;
				let digest = self.forwarders.hash_of_request(Some(kind), &request)?;
				Ok(Output::Hash {
					forwarder: kind.as_str(),
					digest: digest.to_string(),
				})
			},
			Command::Sign(args) => {
				let account = self
					.account
					.as_ref()
					.ok_or("Signing requires an [account] section in the configuration")?;
				let (kind, request) = self.request(args).await?;
				let digest = self.forwarders.hash_of_request(Some(kind), &request)?;
				let signature = account.sign_digest(&digest).await?;
				Ok(Output::Sign {
					forwarder: kind.as_str(),
					digest: digest.to_string(),
					signature: signature.to_string(),
				})
			},
			Command::Verify { request, signature } => {
				let (kind, request) = self.request(request).await?;
				let valid = self.forwarders.verify(Some(kind), &request, signature).await?;
				Ok(Output::Verify {
					forwarder: kind.as_str(),
					valid,
				})
			},
			Command::Execute {
				request,
				signature,
				gas_limit,
				msg_value,
			} => {
				let account = self
					.account
					.as_ref()
					.ok_or("Execution requires an [account] section in the configuration")?;
				let ctx = ExecutionContext::new(account.get_address().await?, *gas_limit)
					.with_value(*msg_value);
				let (kind, request) = self.request(request).await?;
				let result = self
					.forwarders
					.execute(Some(kind), &request, signature, &ctx)
					.await?;
				Ok(Output::Execute {
					forwarder: kind.as_str(),
					success: result.success,
					gas_used: result.gas_used,
					return_data: result.return_data,
				})
			},
			Command::Nonce { forwarder, signer } => {
				let kind = self.forwarders.forwarder(*forwarder)?.kind();
				let nonce = self.forwarders.nonce_of(Some(kind), *signer).await?;
				Ok(Output::Nonce {
					forwarder: kind.as_str(),
					signer: *signer,
					nonce,
				})
			},
			Command::Address => {
				let account = self
					.account
					.as_ref()
					.ok_or("No [account] section in the configuration")?;
				Ok(Output::Address {
					address: account.get_address().await?,
				})
			},
		}
	}

	/// Runs `command` and renders its result.
	pub async fn run(&self, command: &Command, json: bool) -> Result<String, Box<dyn std::error::Error>> {
		let output = self.output(command).await?;
		if json {
			Ok(serde_json::to_string(&output)?)
		} else {
			Ok(output.line())
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::factory_registry::{build_relayer, TEST_CONFIG};
	use alloy_primitives::{address, keccak256};
	use alloy_sol_types::{eip712_domain, sol, SolCall, SolStruct};

	sol! {
		function sum(uint256 a, uint256 b) external pure returns (uint256);

		struct ForwardRequest {
			address from;
			address to;
			uint256 value;
			uint256 gas;
			uint256 nonce;
			bytes data;
		}
	}

	const RELAYEE: Address = address!("26fa9f1a6568b42e29b1787c403b3628dfc0c6fe");
	const ROBUST: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");
	const CALCULATOR: Address = address!("00000000000000000000000000000000000000c1");

	fn relayer() -> Relayer {
		build_relayer(TEST_CONFIG.parse().unwrap()).unwrap()
	}

	fn sum_calldata() -> Bytes {
		sumCall {
			a: U256::from(1),
			b: U256::from(2),
		}
		.abi_encode()
		.into()
	}

	fn request_args(forwarder: Option<ForwarderKind>) -> RequestArgs {
		RequestArgs {
			forwarder,
			from: None,
			to: CALCULATOR,
			data: sum_calldata(),
			value: U256::ZERO,
			gas: U256::from(100_000),
			nonce: None,
		}
	}

	#[tokio::test]
	async fn test_hash_matches_eip712_signing_hash() {
		let output = relayer()
			.run(&Command::Hash(request_args(None)), false)
			.await
			.unwrap();

		let domain = eip712_domain! {
			name: "MinimalForwarder",
			version: "0.0.1",
			chain_id: 1337,
			verifying_contract: ROBUST,
		};
		let expected = ForwardRequest {
			from: RELAYEE,
			to: CALCULATOR,
			value: U256::ZERO,
			gas: U256::from(100_000),
			nonce: U256::ZERO,
			data: sum_calldata(),
		}
		.eip712_signing_hash(&domain);
		assert_eq!(output, expected.to_string());
	}

	#[tokio::test]
	async fn test_hash_of_call_request() {
		let relayer = relayer();
		let simple = relayer
			.run(&Command::Hash(request_args(Some(ForwarderKind::Simple))), false)
			.await
			.unwrap();
		let optimized = relayer
			.run(&Command::Hash(request_args(Some(ForwarderKind::Optimized))), false)
			.await
			.unwrap();

		let mut packed = RELAYEE.to_vec();
		packed.extend_from_slice(CALCULATOR.as_slice());
		packed.extend_from_slice(&sum_calldata());
		assert_eq!(simple, keccak256(&packed).to_string());
		assert_eq!(simple, optimized);
	}

	#[tokio::test]
	async fn test_sign_then_verify() {
		let relayer = relayer();
		let args = request_args(None);
		let signature: Signature = relayer
			.run(&Command::Sign(args.clone()), false)
			.await
			.unwrap()
			.parse()
			.unwrap();

		let verify = Command::Verify {
			request: args.clone(),
			signature,
		};
		assert_eq!(relayer.run(&verify, false).await.unwrap(), "true");

		// The signature belongs to nonce 0 only.
		let stale = Command::Verify {
			request: RequestArgs {
				nonce: Some(U256::from(1)),
				..args
			},
			signature,
		};
		assert_eq!(relayer.run(&stale, false).await.unwrap(), "false");
	}

	#[tokio::test]
	async fn test_json_output() {
		let relayer = relayer();
		let output = relayer
			.run(&Command::Sign(request_args(Some(ForwarderKind::Simple))), true)
			.await
			.unwrap();
		let value: serde_json::Value = serde_json::from_str(&output).unwrap();
		assert_eq!(value["command"], "sign");
		assert_eq!(value["forwarder"], "simple");

		let digest: relay_types::B256 = value["digest"].as_str().unwrap().parse().unwrap();
		let signature: Signature = value["signature"].as_str().unwrap().parse().unwrap();
		let account = relayer.account.as_ref().unwrap();
		assert_eq!(account.sign_digest(&digest).await.unwrap(), signature);
	}

	#[tokio::test]
	async fn test_nonce_and_address() {
		let relayer = relayer();
		let nonce = Command::Nonce {
			forwarder: None,
			signer: RELAYEE,
		};
		assert_eq!(relayer.run(&nonce, false).await.unwrap(), "0");

		let nonce = Command::Nonce {
			forwarder: Some(ForwarderKind::Simple),
			signer: RELAYEE,
		};
		assert_eq!(
			relayer.run(&nonce, false).await.unwrap(),
			"simple forwarder has no nonces"
		);

		assert_eq!(
			relayer.run(&Command::Address, false).await.unwrap(),
			format!("{:#x}", RELAYEE)
		);
	}

	fn file_config(storage_path: &std::path::Path) -> String {
		TEST_CONFIG.replace(
			"primary = \"memory\"\n[storage.implementations.memory]",
			&format!(
				"primary = \"file\"\n[storage.implementations.file]\nstorage_path = \"{}\"",
				storage_path.display()
			),
		)
	}

	async fn sign_and_execute(relayer: &Relayer, args: &RequestArgs) -> (Signature, String) {
		let signature: Signature = relayer
			.run(&Command::Sign(args.clone()), false)
			.await
			.unwrap()
			.parse()
			.unwrap();
		let execute = Command::Execute {
			request: args.clone(),
			signature,
			gas_limit: 1_000_000,
			msg_value: U256::ZERO,
		};
		(signature, relayer.run(&execute, false).await.unwrap())
	}

	#[tokio::test]
	async fn test_execute_advances_persisted_nonce() {
		let dir = tempfile::tempdir().unwrap();
		let config = file_config(dir.path());
		let relayer = build_relayer(config.parse().unwrap()).unwrap();
		let args = request_args(None);
		let nonce = Command::Nonce {
			forwarder: None,
			signer: RELAYEE,
		};

		let (first, output) = sign_and_execute(&relayer, &args).await;
		// Nothing is deployed at the target in the operator tool.
		assert!(output.starts_with("success=true "), "{}", output);
		assert!(output.ends_with(" return_data=0x"), "{}", output);
		assert_eq!(relayer.run(&nonce, false).await.unwrap(), "1");

		let (_, output) = sign_and_execute(&relayer, &args).await;
		assert!(output.starts_with("success=true "), "{}", output);
		assert_eq!(relayer.run(&nonce, false).await.unwrap(), "2");

		let replay = Command::Execute {
			request: RequestArgs {
				nonce: Some(U256::ZERO),
				..args
			},
			signature: first,
			gas_limit: 1_000_000,
			msg_value: U256::ZERO,
		};
		let err = relayer.run(&replay, false).await.err().unwrap();
		assert!(err.to_string().contains("Nonce mismatch"), "{}", err);

		let restarted = build_relayer(config.parse().unwrap()).unwrap();
		assert_eq!(restarted.run(&nonce, false).await.unwrap(), "2");
	}

	#[tokio::test]
	async fn test_execute_json_output() {
		let relayer = relayer();
		let args = request_args(Some(ForwarderKind::Optimized));
		let signature: Signature = relayer
			.run(&Command::Sign(args.clone()), false)
			.await
			.unwrap()
			.parse()
			.unwrap();
		let execute = Command::Execute {
			request: args,
			signature,
			gas_limit: 1_000_000,
			msg_value: U256::ZERO,
		};

		let value: serde_json::Value =
			serde_json::from_str(&relayer.run(&execute, true).await.unwrap()).unwrap();
		assert_eq!(value["command"], "execute");
		assert_eq!(value["forwarder"], "optimized");
		assert_eq!(value["success"], true);
		assert_eq!(value["return_data"], "0x");
		assert!(value["gas_used"].as_u64().unwrap() > 21_000);
	}

	#[tokio::test]
	async fn test_sign_requires_account() {
		let config = TEST_CONFIG
			.split("[account]")
			.next()
			.unwrap()
			.to_string();
		let relayer = build_relayer(config.parse().unwrap()).unwrap();

		let err = relayer
			.run(&Command::Sign(request_args(None)), false)
			.await
			.err()
			.unwrap();
		assert!(err.to_string().contains("[account]"));

		let err = relayer
			.run(&Command::Hash(request_args(None)), false)
			.await
			.err()
			.unwrap();
		assert!(err.to_string().contains("--from"));
	}
}
