/*!

This is the long-form manual for `quadratic_voting` and `qvtally`.

## Quadratic voting

Every voter receives the same budget of credits for an event (`creditsPerVoter`) and spreads
them over the options. Spending `c` credits on an option gives it `sqrt(c)` votes: putting
all 100 credits on one option gives it 10 votes, while spreading them as 25 credits on four
options gives each of them 5 votes. The votes of all the voters are then summed per option.

A voter (identified by an invite code, or by an anonymous identifier for public events) has
at most one live vote. Submitting again replaces the previous vote.

A vote is refused if:
- it is submitted outside of the voting window (`startTime` to `endTime`, both included)
- it refers to an option that is not part of the event
- it spends a negative or fractional number of credits on an option
- it spends more credits than the budget

## Decision frameworks

The results depend on the decision framework of the event. Option ids must be unique
within an event.

### `binary_selection`

Options are ranked by votes and split between selected and not selected options.

| `threshold_mode` | selected options | required field |
|------------------|------------------|----------------|
| `top_n` | the first `top_n_count` options | `top_n_count` |
| `percentage` | at least `percentage_threshold`% of the highest vote total | `percentage_threshold` |
| `absolute_votes` | at least `absolute_vote_threshold` votes | `absolute_vote_threshold` |
| `above_average` | at least the mean vote total of all the options | |

For `top_n`, the results also report the selection margin: the difference of votes between
the last selected option and the first option that was not selected.

Ties are resolved with the `tiebreaker` option:
- `timestamp` (default): the option created first wins. Options without a creation time
  come after the others, in display order.
- `alphabetical`: by title.
- `random`: a permutation derived from `random_seed` (default 0) with a cryptographic hash.
  It is hard to guess in advance, but the same seed always gives the same order, so that
  the results can be recomputed.

### `proportional_distribution`

A pool of resources (`total_pool_amount` of `resource_name`) is split between the options in
proportion to their votes. If `minimum_allocation_enabled` is set, every option that received
votes gets at least `minimum_allocation_percentage`% of the pool. When these floors push the
total above the pool, all the allocations are scaled down by the same factor.

Note that a high floor combined with many options can produce a distribution where most
options receive the same small amount. This is the expected outcome of the rules above.

The results include the Gini coefficient of the allocations: 0 for a perfectly even split,
and close to 1 when a single option receives everything. Amounts are displayed with
`decimal_places` decimals (default 2, at most 15).

## Event files

`qvtally` reads the description of an event from a JSON file:

```json
{
  "event": {
    "id": "budget-2026",
    "title": "Neighbourhood budget",
    "startTime": "2026-03-01T00:00:00Z",
    "endTime": "2026-03-08T00:00:00Z",
    "creditsPerVoter": 100,
    "decisionFramework": {
      "framework_type": "binary_selection",
      "config": { "threshold_mode": "top_n", "top_n_count": 2, "tiebreaker": "alphabetical" }
    }
  },
  "options": [
    { "id": "park", "title": "New park", "position": 0 },
    { "id": "library", "title": "Library hours", "position": 1 }
  ],
  "votes": [
    { "inviteCode": "X7KQ", "allocations": { "park": 64, "library": 36 } }
  ],
  "voteSources": [
    { "provider": "csv", "filePath": "votes.csv" }
  ]
}
```

Inline votes may carry a `submittedAt` timestamp. Without it, the vote is considered
submitted at the start of the event.

### `csv` vote sources

```text
invite_code,park,library
X7KQ,64,36
,100,
```

The first row contains the option ids. Empty cells count as zero credits. A row without an
invite code is attributed to an anonymous voter, derived from the file name and line number.

Votes that are refused are reported in the logs and counted in the summary, and do not stop
the tabulation.

 */
